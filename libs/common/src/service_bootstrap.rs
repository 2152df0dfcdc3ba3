//! Unified service bootstrap utilities
//!
//! Startup banner and logging initialization shared by the service binaries.

use crate::logging::{self, LogConfig};
use std::path::PathBuf;
use tracing::info;

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "alarmsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
    /// Default port
    pub default_port: u16,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
  █████╗ ██╗      █████╗ ██████╗ ███╗   ███╗
 ██╔══██╗██║     ██╔══██╗██╔══██╗████╗ ████║
 ███████║██║     ███████║██████╔╝██╔████╔██║
 ██╔══██║██║     ██╔══██║██╔══██╗██║╚██╔╝██║
 ██║  ██║███████╗██║  ██║██║  ██║██║ ╚═╝ ██║
 ╚═╝  ╚═╝╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚═╝
    "#;

    info!("{}", banner);
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
    info!("");
}

/// Logging options for a service, as passed on the command line and config
#[derive(Debug, Clone, Default)]
pub struct LogOptions<'a> {
    pub level: &'a str,
    pub log_dir: Option<&'a str>,
    pub enable_json: bool,
    /// Plain console output when set
    pub no_color: bool,
}

fn log_config(service: &ServiceInfo, options: &LogOptions<'_>) -> LogConfig {
    let log_dir = std::env::var("ALARM_LOG_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .or_else(|| options.log_dir.map(str::to_string))
        .map(|dir| PathBuf::from(dir).join(&service.name));

    LogConfig {
        service_name: service.name.clone(),
        log_dir,
        level: logging::parse_level(options.level),
        enable_json: options.enable_json,
        ansi: !options.no_color,
    }
}

/// Initialize logging for a service
///
/// Log directory priority:
/// 1. `ALARM_LOG_DIR` environment variable
/// 2. `log_dir` option (from configuration)
/// 3. console only
pub fn init_logging(service: &ServiceInfo, options: &LogOptions<'_>) -> anyhow::Result<()> {
    logging::init_with_config(log_config(service, options))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_no_color_disables_console_ansi() {
        let service = ServiceInfo::new("alarmsrv", "Smart Alarm Service", 8000);

        let colored = log_config(
            &service,
            &LogOptions {
                level: "debug",
                ..Default::default()
            },
        );
        assert!(colored.ansi);
        assert_eq!(colored.level, Level::DEBUG);

        let plain = log_config(
            &service,
            &LogOptions {
                level: "info",
                no_color: true,
                ..Default::default()
            },
        );
        assert!(!plain.ansi);
        assert_eq!(plain.service_name, "alarmsrv");
    }
}
