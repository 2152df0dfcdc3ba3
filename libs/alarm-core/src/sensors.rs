//! One-shot reads of the environment sensor topic

use crate::broker::Broker;
use crate::error::{AlarmError, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bedroom climate reading published by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorsData {
    pub temperature: f64,
    pub humidity: f64,
}

/// Subscribes, waits for the first decodable reading, then unsubscribes
#[derive(Clone)]
pub struct SensorReader {
    broker: Arc<dyn Broker>,
    topic: String,
    timeout: Duration,
}

impl SensorReader {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            broker,
            topic: topic.into(),
            timeout,
        }
    }

    pub async fn latest(&self) -> Result<SensorsData> {
        let mut stream = self.broker.subscribe(&self.topic).await?;

        let wait = async {
            while let Some(item) = stream.next().await {
                let payload = item?;
                match serde_json::from_slice::<SensorsData>(&payload) {
                    Ok(data) => return Ok(Some(data)),
                    Err(e) => warn!("Malformed sensor payload skipped: {}", e),
                }
            }
            Ok(None)
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(Ok(Some(data))) => {
                debug!(
                    "Sensor reading: temperature={} humidity={}",
                    data.temperature, data.humidity
                );
                Ok(data)
            },
            Ok(Ok(None)) | Err(_) => Err(AlarmError::NoSensorData(self.timeout)),
            Ok(Err(e)) => Err(e),
        }
    }
}
