//! Serial link to the charger.
//!
//! The link is either a local serial port or a TCP connection to a networked
//! serial server. Either way, writes happen on the caller's thread and reads
//! on a dedicated reader thread that forwards raw chunks over a channel.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use serialport::FlowControl;
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::event_loop::Input;

/// Size of a single read from the link.
const READ_CHUNK: usize = 64;

/// Writing half of an open link.
pub type LinkWriter = Box<dyn Write + Send>;

/// Handle to the reader thread.
pub struct ReaderHandle {
    name: String,
    thread: JoinHandle<()>,
}

impl ReaderHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the reader to exit. It checks the stop flag after every read
    /// timeout.
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!("Reader thread for {} panicked", self.name);
        }
    }
}

/// Open the configured link and start its reader thread.
pub fn open(
    config: &LinkConfig,
    tx: Sender<Input>,
    stop: Arc<AtomicBool>,
) -> RunnerResult<(LinkWriter, ReaderHandle)> {
    if let Some(address) = &config.tcp {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(config.read_timeout()))?;
        info!("Connected to serial server at {}", address);
        let reader = stream.try_clone()?;
        let handle = spawn_reader(address.clone(), reader, tx, stop)?;
        return Ok((Box::new(stream), handle));
    }

    let Some(path) = &config.port else {
        return Err(RunnerError::Config("no serial port or TCP address configured".into()));
    };
    let port = serialport::new(path, config.baud_rate)
        .flow_control(FlowControl::None)
        .timeout(config.read_timeout())
        .open()?;
    info!("Opened {} at {} baud", path, config.baud_rate);
    let reader = port.try_clone()?;
    let handle = spawn_reader(path.clone(), reader, tx, stop)?;
    Ok((Box::new(port), handle))
}

/// Spawn a thread forwarding everything read from `reader` as [`Input::Link`].
///
/// The thread exits when `stop` is set, when the receiver is dropped, or on
/// end of stream or a read error, in which case it sends [`Input::LinkClosed`].
pub fn spawn_reader<R>(
    name: String,
    mut reader: R,
    tx: Sender<Input>,
    stop: Arc<AtomicBool>,
) -> RunnerResult<ReaderHandle>
where
    R: Read + Send + 'static,
{
    let thread_name = name.clone();
    let thread = thread::Builder::new()
        .name(format!("link-{}", name))
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            while !stop.load(Ordering::Relaxed) {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!("Link {} reached end of stream", thread_name);
                        let _ = tx.send(Input::LinkClosed("end of stream".into()));
                        break;
                    }
                    Ok(n) => {
                        trace!("Link {} read {} bytes", thread_name, n);
                        if tx.send(Input::Link(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if is_timeout(&e) => continue,
                    Err(e) => {
                        warn!("Link {} read failed: {}", thread_name, e);
                        let _ = tx.send(Input::LinkClosed(e.to_string()));
                        break;
                    }
                }
            }
        })?;
    Ok(ReaderHandle { name, thread })
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
