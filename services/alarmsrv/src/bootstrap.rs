//! Service Bootstrap
//!
//! Command-line arguments and the overrides they apply on top of the loaded
//! configuration.

use clap::Parser;
use common::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::AlarmSrvConfig;

/// Command-line arguments for alarmsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "alarmsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Smart Alarm Service",
    long_about = None
)]
pub struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(short = 'c', long, env = "ALARMSRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind address for API server (e.g. 127.0.0.1:8000)
    #[arg(short = 'b', long, env = "BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// SQLite database path
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored log output and the startup banner
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    /// Apply CLI overrides to `config`
    pub fn apply(&self, config: &mut AlarmSrvConfig) {
        if let Some(db_path) = &self.db_path {
            config.database.path = db_path.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

/// Resolve the API listen address
///
/// `--bind-address` wins over `service.host`/`service.port`.
pub fn bind_address(args: &Args, config: &AlarmSrvConfig) -> Result<SocketAddr, ConfigError> {
    let raw = args
        .bind_address
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.service.host, config.service.port));
    raw.parse()
        .map_err(|e| ConfigError(format!("Invalid bind address '{}': {}", raw, e)))
}
