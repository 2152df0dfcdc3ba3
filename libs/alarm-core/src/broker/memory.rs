//! In-process broker backed by tokio broadcast channels

use super::{Broker, MessageStream};
use crate::error::{AlarmError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

/// In-memory [`Broker`] with hooks to simulate outages
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    published: Mutex<Vec<(String, Bytes)>>,
    connected: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Toggle reachability; going offline also ends every open subscription
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        if !connected {
            self.drop_subscriptions();
        }
    }

    /// End all open subscriptions without changing reachability
    pub fn drop_subscriptions(&self) {
        self.topics.lock().clear();
    }

    /// Live subscribers on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Payloads published on `topic`, oldest first
    pub fn published(&self, topic: &str) -> Vec<Bytes> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AlarmError::NotConnected("memory broker offline".to_string()));
        }

        self.published
            .lock()
            .push((topic.to_string(), payload.clone()));

        if let Some(tx) = self.topics.lock().get(topic) {
            // No receivers is fine: at-most-once
            let _ = tx.send(payload);
        }
        debug!("Published to {}", topic);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AlarmError::Subscribe {
                topic: topic.to_string(),
                reason: "memory broker offline".to_string(),
            });
        }

        let rx = self
            .topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((Ok(payload), rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Subscriber lagged, {} messages skipped", skipped);
                    },
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broker = MemoryBroker::new();
        let mut stream = broker.subscribe("alarm/status").await.unwrap();
        broker
            .publish("alarm/status", Bytes::from_static(b"off"))
            .await
            .unwrap();

        let payload = stream.next().await.unwrap().unwrap();
        assert_eq!(payload, Bytes::from_static(b"off"));
        assert_eq!(broker.published("alarm/status").len(), 1);
    }

    #[tokio::test]
    async fn test_offline_broker_rejects_and_ends_streams() {
        let broker = MemoryBroker::new();
        let mut stream = broker.subscribe("alarm/status").await.unwrap();
        broker.set_connected(false);

        assert!(stream.next().await.is_none());
        assert!(broker
            .publish("alarm/time", Bytes::from_static(b"30"))
            .await
            .is_err());
        assert!(broker.subscribe("alarm/status").await.is_err());
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let broker = MemoryBroker::new();
        let stream = broker.subscribe("sensors/data").await.unwrap();
        assert_eq!(broker.subscriber_count("sensors/data"), 1);
        drop(stream);
        assert_eq!(broker.subscriber_count("sensors/data"), 0);
    }
}
