//! Status Listener
//!
//! Long-lived subscriber on the alarm status topic. Each payload is decoded
//! and applied to the [`AlarmStateMachine`]; triggers are also persisted as
//! "alarm fired today". Lost subscriptions are re-established with
//! exponential backoff until the retry budget runs out.
//!
//! ```text
//! broker ──▶ subscribe ──▶ decode ──▶ AlarmStateMachine
//!    ▲           │                        │ (trigger)
//!    │        dropped                     ▼
//!    └──── backoff ◀──┘              SleepStore
//! ```

use crate::broker::{Broker, MessageStream};
use crate::error::{AlarmError, Result};
use crate::state::AlarmStateMachine;
use crate::store::{self, SleepStore};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bare payload still sent by older firmware when the alarm is switched off
pub const LEGACY_OFF_PAYLOAD: &str = "off";

/// Decoded status-topic message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Status {
        active: Option<bool>,
        triggered: Option<bool>,
    },
    LegacyOff,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    triggered: Option<bool>,
}

/// Decode a raw status payload
pub fn decode_status(payload: &[u8]) -> Result<StatusEvent> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| AlarmError::Decode(format!("payload is not UTF-8: {}", e)))?;

    if text.trim() == LEGACY_OFF_PAYLOAD {
        return Ok(StatusEvent::LegacyOff);
    }

    let decoded: StatusPayload = serde_json::from_str(text)?;
    Ok(StatusEvent::Status {
        active: decoded.active,
        triggered: decoded.triggered,
    })
}

/// Resubscription backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed resubscriptions tolerated before giving up
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based), doubling up to `max_backoff`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_retries: 10,
        }
    }
}

enum Flow {
    Cancelled,
    Dropped(String),
}

pub struct StatusListener {
    broker: Arc<dyn Broker>,
    topic: String,
    machine: AlarmStateMachine,
    store: Arc<dyn SleepStore>,
    retry: RetryPolicy,
}

impl StatusListener {
    pub fn new(
        broker: Arc<dyn Broker>,
        topic: impl Into<String>,
        machine: AlarmStateMachine,
        store: Arc<dyn SleepStore>,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            machine,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run on a background task until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(token))
    }

    pub async fn run(self, token: CancellationToken) -> Result<()> {
        info!("StatusListener started: {}", self.topic);
        let mut failures: u32 = 0;

        loop {
            let subscribed = tokio::select! {
                result = self.broker.subscribe(&self.topic) => result,
                _ = token.cancelled() => break,
            };

            match subscribed {
                Ok(mut stream) => {
                    // Confirmed subscription: the outage is over
                    failures = 0;
                    debug!("Subscribed: {}", self.topic);
                    match self.consume(&mut stream, &token).await {
                        Flow::Cancelled => break,
                        Flow::Dropped(reason) => {
                            warn!("Subscription {} dropped: {}", self.topic, reason)
                        },
                    }
                },
                Err(e) => warn!("Subscribe {} failed: {}", self.topic, e),
            }

            failures += 1;
            if failures > self.retry.max_retries {
                error!(
                    "FATAL: StatusListener giving up on {} after {} attempts",
                    self.topic, failures
                );
                self.machine.shutdown();
                return Err(AlarmError::RetryBudgetExhausted {
                    topic: self.topic.clone(),
                    attempts: failures,
                });
            }

            let delay = self.retry.backoff(failures);
            warn!(
                "Resubscribing {} in {:?} ({}/{})",
                self.topic, delay, failures, self.retry.max_retries
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => break,
            }
        }

        // Stream already dropped here; only the timer may still be pending
        self.machine.shutdown();
        info!("StatusListener stopped: {}", self.topic);
        Ok(())
    }

    async fn consume(&self, stream: &mut MessageStream, token: &CancellationToken) -> Flow {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Flow::Cancelled,
                next = stream.next() => match next {
                    Some(Ok(payload)) => self.handle_payload(&payload).await,
                    Some(Err(e)) => return Flow::Dropped(e.to_string()),
                    None => return Flow::Dropped("stream ended".to_string()),
                },
            }
        }
    }

    /// Apply one raw payload; never fails
    pub async fn handle_payload(&self, payload: &[u8]) {
        debug!("Received message: {}", String::from_utf8_lossy(payload));

        match decode_status(payload) {
            Ok(StatusEvent::LegacyOff) => {
                info!("Alarm switched off on device (legacy signal)");
            },
            Ok(StatusEvent::Status { active, triggered }) => {
                self.machine.observe_status(active, triggered);
                if triggered == Some(true) {
                    self.persist_trigger().await;
                }
            },
            Err(e) => {
                warn!("Malformed status payload skipped: {}", e);
            },
        }
    }

    async fn persist_trigger(&self) {
        let today = store::today();
        if let Err(e) = self.store.mark_alarm_fired(today).await {
            // In-memory state stays authoritative
            error!(
                "Persist alarm fired for {} failed: {}",
                store::day_key(today),
                e
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::state::AlarmStatus;
    use crate::store::MemorySleepStore;
    use tracing_test::traced_test;

    fn setup() -> (Arc<MemorySleepStore>, AlarmStateMachine, StatusListener) {
        let store = Arc::new(MemorySleepStore::new());
        let machine = AlarmStateMachine::new(Duration::from_secs(10));
        let listener = StatusListener::new(
            Arc::new(MemoryBroker::new()),
            "alarm/status",
            machine.clone(),
            store.clone(),
        );
        (store, machine, listener)
    }

    #[test]
    fn test_decode_structured() {
        assert_eq!(
            decode_status(br#"{"active": true, "triggered": false}"#).unwrap(),
            StatusEvent::Status {
                active: Some(true),
                triggered: Some(false)
            }
        );
        assert_eq!(
            decode_status(br#"{"triggered": true}"#).unwrap(),
            StatusEvent::Status {
                active: None,
                triggered: Some(true)
            }
        );
    }

    #[test]
    fn test_decode_legacy_off() {
        assert_eq!(decode_status(b"off").unwrap(), StatusEvent::LegacyOff);
        assert_eq!(decode_status(b" off\n").unwrap(), StatusEvent::LegacyOff);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for payload in [&b"on"[..], b"{\"active\": ", b"42", b"\xff\xfe", b"{\"active\": \"yes\"}"] {
            assert!(matches!(decode_status(payload), Err(AlarmError::Decode(_))));
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            max_retries: 5,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_malformed_payload_is_logged_and_ignored() {
        let (_store, machine, listener) = setup();
        listener
            .handle_payload(br#"{"active": true, "triggered": false}"#)
            .await;
        let before = machine.snapshot();

        listener.handle_payload(b"not json").await;
        assert_eq!(machine.snapshot(), before);
        assert!(logs_contain("Malformed status payload skipped"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_legacy_off_only_logs() {
        let (store, machine, listener) = setup();
        machine.arm(30);
        listener.handle_payload(b"off").await;

        assert_eq!(
            machine.snapshot(),
            AlarmStatus {
                armed: true,
                triggered: false
            }
        );
        assert!(store.is_empty());
        assert!(logs_contain("legacy signal"));
    }

    #[tokio::test]
    async fn test_trigger_persists_alarm_fired() {
        let (store, machine, listener) = setup();
        listener
            .handle_payload(br#"{"active": true, "triggered": true}"#)
            .await;

        assert!(machine.snapshot().triggered);
        let record = store.get_record(store::today()).await.unwrap().unwrap();
        assert!(record.alarm_fired);
        assert!(!record.rated);
    }

    #[tokio::test]
    async fn test_trigger_after_rating_keeps_rated() {
        let (store, _machine, listener) = setup();
        store.mark_rated(store::today()).await.unwrap();
        listener.handle_payload(br#"{"triggered": true}"#).await;

        let record = store.get_record(store::today()).await.unwrap().unwrap();
        assert!(record.rated);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_persist_failure_keeps_memory_state() {
        let (store, machine, listener) = setup();
        store.set_unavailable(true);
        listener
            .handle_payload(br#"{"active": true, "triggered": true}"#)
            .await;

        assert_eq!(
            machine.snapshot(),
            AlarmStatus {
                armed: true,
                triggered: true
            }
        );
        assert!(logs_contain("Persist alarm fired"));
    }
}
