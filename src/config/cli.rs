// src/config/cli.rs
use super::{load_config, Config};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Mirror a line-oriented client connection to several backend servers.
#[derive(Debug, Parser)]
#[command(name = "fanout-proxy", version, about)]
pub struct Cli {
    /// YAML or JSON config file; flags override its values
    #[arg(short, long, env = "FANOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen for client connections
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Backends the proxy connects to, separated by ','
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Start the admin HTTP server on this port
    #[arg(long = "http")]
    pub http_port: Option<u16>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

impl Cli {
    /// Merge the optional config file with the flags and validate the result.
    pub async fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path).await?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if !self.hosts.is_empty() {
            config.backends = self.hosts;
        }
        if let Some(port) = self.http_port.filter(|p| *p > 0) {
            config.admin.enabled = true;
            config.admin.port = port;
        }
        if let Some(port) = self.metrics_port.filter(|p| *p > 0) {
            config.metrics.enabled = true;
            config.metrics.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}
