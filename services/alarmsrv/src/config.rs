//! AlarmSrv Configuration
//!
//! Loaded in layers: built-in defaults, `config/alarmsrv.yaml` (or the file
//! given with `--config`), then `ALARMSRV_` environment variables with `__`
//! separating nested keys (e.g. `ALARMSRV_MQTT__HOST=broker.local`).

use alarm_core::RetryPolicy;
use common::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SERVICE_NAME: &str = "alarmsrv";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSrvConfig {
    pub service: ServiceConfig,
    pub mqtt: MqttConfig,
    pub alarm: AlarmConfig,
    pub listener: ListenerConfig,
    pub sensors: SensorsConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// MQTT broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// 0, 1 or 2
    pub qos: u8,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topics: TopicsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Outbound arm/cancel commands
    pub alarm_time: String,
    /// Inbound device status
    pub alarm_status: String,
    /// Inbound temperature/humidity readings
    pub sensors: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Seconds before a trigger clears itself
    pub auto_reset_secs: u64,
}

/// Status listener resubscription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Root directory for rolling files; console only when unset
    pub dir: Option<String>,
    pub json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: SERVICE_NAME.to_string(),
            keep_alive_secs: 30,
            qos: 0,
            username: None,
            password: None,
            topics: TopicsConfig::default(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            alarm_time: "alarm/time".to_string(),
            alarm_status: "alarm/status".to_string(),
            sensors: "sensors/data".to_string(),
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            auto_reset_secs: 10,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_retries: 10,
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 10,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/smart_alarm.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}

impl AlarmSrvConfig {
    /// Load and validate configuration
    pub fn load(explicit_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = common::load_config(SERVICE_NAME, explicit_file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError("mqtt.host must not be empty".to_string()));
        }
        if self.mqtt.qos > 2 {
            return Err(ConfigError(format!(
                "mqtt.qos must be 0, 1 or 2, got {}",
                self.mqtt.qos
            )));
        }

        let topics = [
            ("mqtt.topics.alarm_time", &self.mqtt.topics.alarm_time),
            ("mqtt.topics.alarm_status", &self.mqtt.topics.alarm_status),
            ("mqtt.topics.sensors", &self.mqtt.topics.sensors),
        ];
        for (key, topic) in topics {
            if topic.trim().is_empty() {
                return Err(ConfigError(format!("{} must not be empty", key)));
            }
        }

        if self.alarm.auto_reset_secs == 0 {
            return Err(ConfigError(
                "alarm.auto_reset_secs must be greater than 0".to_string(),
            ));
        }
        if self.listener.initial_backoff_ms > self.listener.max_backoff_ms {
            return Err(ConfigError(
                "listener.initial_backoff_ms exceeds listener.max_backoff_ms".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn auto_reset(&self) -> Duration {
        Duration::from_secs(self.alarm.auto_reset_secs)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_secs(self.sensors.read_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.listener.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.listener.max_backoff_ms),
            max_retries: self.listener.max_retries,
        }
    }
}
