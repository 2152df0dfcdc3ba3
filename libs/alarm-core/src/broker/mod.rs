//! Broker abstraction
//!
//! Publish/subscribe primitive consumed by the listener, the command
//! publisher and the sensor reader. Delivery is at-most-once.
//!
//! Implementations:
//! - `MqttBroker` (in the service crate): production MQTT backend
//! - `MemoryBroker`: in-process backend for testing

mod memory;

pub use memory::MemoryBroker;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Lazy sequence of raw payloads for one subscription
///
/// An `Err` item reports a connection problem; the end of the stream means
/// the subscription is gone. Dropping the stream unsubscribes.
pub type MessageStream = BoxStream<'static, Result<Bytes>>;

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Publish `payload` on `topic`
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Start a fresh subscription on `topic`
    ///
    /// Returns `Ok` only once the broker has accepted the subscription.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;
}
