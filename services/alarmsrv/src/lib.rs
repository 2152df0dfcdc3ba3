//! Smart Alarm Service (AlarmSrv)
//!
//! Wires the alarm subsystem to its outer surfaces: the MQTT broker adapter,
//! the HTTP API, configuration and the command line.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod mqtt;

pub use api::{create_router, ApiError, AppState};
pub use config::AlarmSrvConfig;
pub use mqtt::MqttBroker;
