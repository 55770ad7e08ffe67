use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use evse_bridge::Event;
use evse_runner::{host, link, Cli, EventLoop, JsonLinesSink, JsonSettingsStore, RunnerResult};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> RunnerResult<()> {
    let config = cli.load_config()?;
    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }
    config.validate()?;

    #[cfg(feature = "prometheus")]
    if let Some(addr) = cli.metrics_listen {
        evse_metrics::install_prometheus_exporter(addr)
            .map_err(|e| evse_runner::RunnerError::Config(format!("metrics exporter: {e}")))?;
        info!("Serving metrics on {}", addr);
    }
    evse_metrics::describe_metrics();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))?;
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let (writer, reader) = link::open(&config.link, tx.clone(), stop.clone())?;
    host::spawn_stdin_reader(tx, config.bridge.identify_blinks)?;

    let store = JsonSettingsStore::new(&config.settings_path);
    let sink = JsonLinesSink::new(io::stdout(), config.bridge.name.clone());
    let mut event_loop = EventLoop::new(config.bridge.clone(), writer, store, sink)?;
    if cli.connected {
        event_loop.dispatch(Event::NetworkStateChanged { connected: true })?;
    }

    info!("Bridging {} via {}", config.bridge.name, reader.name());
    let result = event_loop.run(&rx, &stop);

    stop.store(true, Ordering::Relaxed);
    reader.join();
    result
}
