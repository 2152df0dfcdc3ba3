//! Outbound alarm commands
//!
//! The local transition is applied only after the publish succeeds; a failed
//! publish leaves the state machine untouched.

use crate::broker::Broker;
use crate::error::Result;
use crate::state::AlarmStateMachine;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, warn};

/// Payload that disarms the device
pub const CANCEL_PAYLOAD: &str = "0";

#[derive(Clone)]
pub struct AlarmCommander {
    broker: Arc<dyn Broker>,
    topic: String,
    machine: AlarmStateMachine,
}

impl AlarmCommander {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>, machine: AlarmStateMachine) -> Self {
        Self {
            broker,
            topic: topic.into(),
            machine,
        }
    }

    /// Publish the arm duration (decimal seconds), then arm locally
    pub async fn arm(&self, duration_secs: u32) -> Result<()> {
        self.send(&duration_secs.to_string()).await?;
        self.machine.arm(duration_secs);
        info!("Arm command sent: {}s", duration_secs);
        Ok(())
    }

    /// Publish the zero-duration sentinel, then cancel locally
    pub async fn cancel(&self) -> Result<()> {
        self.send(CANCEL_PAYLOAD).await?;
        self.machine.cancel();
        info!("Cancel command sent");
        Ok(())
    }

    async fn send(&self, payload: &str) -> Result<()> {
        self.broker
            .publish(&self.topic, Bytes::copy_from_slice(payload.as_bytes()))
            .await
            .inspect_err(|e| warn!("Alarm command on {} failed: {}", self.topic, e))
    }
}
