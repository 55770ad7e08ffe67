//! Command line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::RunnerConfig;
use crate::error::RunnerResult;

/// Bridge an OpenEVSE charger's serial interface to a host controller.
#[derive(Parser, Debug)]
#[command(name = "openevse-bridge", version, about)]
pub struct Cli {
    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device the charger is attached to.
    #[arg(short, long)]
    pub port: Option<String>,

    /// Connect to a networked serial server (host:port) instead of a local port.
    #[arg(long, conflicts_with = "port")]
    pub tcp: Option<String>,

    /// Serial baud rate.
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Settings file.
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `evse_bridge=trace`. Defaults to `RUST_LOG`, then `info`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Start as if the host were already connected to its network.
    #[arg(long)]
    pub connected: bool,

    /// Print the effective configuration as YAML and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Serve Prometheus metrics on this address.
    #[cfg(feature = "prometheus")]
    #[arg(long)]
    pub metrics_listen: Option<std::net::SocketAddr>,
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then flags.
    pub fn load_config(&self) -> RunnerResult<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };
        if let Some(port) = &self.port {
            config.link.port = Some(port.clone());
            config.link.tcp = None;
        }
        if let Some(tcp) = &self.tcp {
            config.link.tcp = Some(tcp.clone());
            config.link.port = None;
        }
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
        if let Some(settings) = &self.settings {
            config.settings_path = settings.clone();
        }
        Ok(config)
    }
}
