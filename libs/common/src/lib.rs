//! Shared service plumbing for the smart alarm backend
//!
//! - logging functions
//! - layered configuration loading
//! - graceful shutdown
//! - HTTP response envelopes

pub mod api_types;
pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use api_types::{ErrorInfo, ErrorResponse, HealthStatus, MessageResponse};

#[cfg(feature = "axum")]
pub use api_types::AppError;

pub use config_loader::{load_config, ConfigError};
pub use shutdown::{cancel_on_signal, wait_for_shutdown};
