//! Alarm subsystem error types

use thiserror::Error;

/// Result type for alarm operations
pub type Result<T> = std::result::Result<T, AlarmError>;

/// Alarm subsystem errors
#[derive(Debug, Error)]
pub enum AlarmError {
    /// Broker is not reachable
    #[error("Broker not connected: {0}")]
    NotConnected(String),

    /// Publish to the broker failed
    #[error("Publish failed on {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// Subscribing to a topic failed
    #[error("Subscribe failed on {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Subscription dropped and could not be re-established
    #[error("Subscription to {topic} lost after {attempts} attempts")]
    RetryBudgetExhausted { topic: String, attempts: u32 },

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Durable store failure
    #[error("Database error: {0}")]
    Database(String),

    /// Caller supplied an invalid value
    #[error("Invalid parameter: {param}: {reason}")]
    InvalidParameter { param: String, reason: String },

    /// No sensor reading arrived in time
    #[error("No sensor data received within {0:?}")]
    NoSensorData(std::time::Duration),
}

impl From<sqlx::Error> for AlarmError {
    fn from(err: sqlx::Error) -> Self {
        AlarmError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AlarmError {
    fn from(err: serde_json::Error) -> Self {
        AlarmError::Decode(err.to_string())
    }
}
