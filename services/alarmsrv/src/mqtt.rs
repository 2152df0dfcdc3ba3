//! MQTT broker adapter
//!
//! One long-lived client publishes commands; its event loop runs on a
//! background task and tracks connectivity. Every subscription opens its own
//! client so that dropping the returned stream closes the session; the stream
//! is handed out only after the broker acknowledges the SUBSCRIBE.

use crate::config::MqttConfig;
use alarm_core::{AlarmError, Broker, MessageStream, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const SUBACK_TIMEOUT: Duration = Duration::from_secs(10);

static SUBSCRIPTION_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn qos_from(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

pub struct MqttBroker {
    config: MqttConfig,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl MqttBroker {
    /// Create the publisher client and start its event loop
    ///
    /// Returns immediately; the connection is established in the background
    /// and re-established after failures until `shutdown` is cancelled.
    pub fn connect(config: MqttConfig, shutdown: CancellationToken) -> Self {
        let options = build_options(&config, &config.client_id);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(drive_publisher(
            eventloop,
            connected.clone(),
            shutdown.clone(),
            format!("{}:{}", config.host, config.port),
        ));

        Self {
            config,
            client,
            connected,
            shutdown,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send DISCONNECT and stop the event loop
    pub async fn disconnect(&self) {
        if self.is_connected() {
            if let Err(e) = self.client.disconnect().await {
                warn!("MQTT disconnect failed: {}", e);
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        info!("Disconnected from MQTT broker");
    }

    fn qos(&self) -> QoS {
        qos_from(self.config.qos)
    }
}

fn build_options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }
    options
}

async fn drive_publisher(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
    endpoint: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected.store(true, Ordering::SeqCst);
                    info!("Connected to MQTT broker: {}", endpoint);
                }
                Ok(notification) => debug!("MQTT event: {:?}", notification),
                Err(e) => {
                    if connected.swap(false, Ordering::SeqCst) {
                        error!("MQTT connection lost: {}", e);
                    } else {
                        debug!("MQTT connect to {} failed: {}", endpoint, e);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            },
        }
    }
    connected.store(false, Ordering::SeqCst);
    debug!("MQTT publisher loop stopped");
}

struct Subscription {
    // Held so the event loop's request channel stays open
    _client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    done: bool,
}

async fn next_payload(mut sub: Subscription) -> Option<(Result<Bytes>, Subscription)> {
    if sub.done {
        return None;
    }
    loop {
        match sub.eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                return Some((Ok(publish.payload), sub));
            },
            Ok(_) => {},
            Err(e) => {
                sub.done = true;
                debug!("Subscription {} lost: {}", sub.topic, e);
                let err = AlarmError::NotConnected(e.to_string());
                return Some((Err(err), sub));
            },
        }
    }
}

/// Drive a fresh event loop until the SUBSCRIBE is acknowledged
async fn await_suback(eventloop: &mut EventLoop, topic: &str) -> Result<()> {
    let subscribe_error = |reason: String| AlarmError::Subscribe {
        topic: topic.to_string(),
        reason,
    };

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    return Err(subscribe_error("rejected by broker".to_string()));
                }
                debug!("Subscription acknowledged: {}", topic);
                return Ok(());
            },
            Ok(_) => {},
            Err(e) => return Err(subscribe_error(e.to_string())),
        }
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(AlarmError::NotConnected(
                "Not connected to MQTT broker".to_string(),
            ));
        }

        self.client
            .publish(topic, self.qos(), false, payload.to_vec())
            .await
            .map_err(|e| AlarmError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Published message to topic: {}", topic);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let seq = SUBSCRIPTION_SEQ.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("{}-sub-{}", self.config.client_id, seq);
        let (client, mut eventloop) =
            AsyncClient::new(build_options(&self.config, &client_id), REQUEST_CAPACITY);

        client
            .subscribe(topic, self.qos())
            .await
            .map_err(|e| AlarmError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tokio::time::timeout(SUBACK_TIMEOUT, await_suback(&mut eventloop, topic))
            .await
            .map_err(|_| AlarmError::Subscribe {
                topic: topic.to_string(),
                reason: format!("no SUBACK within {:?}", SUBACK_TIMEOUT),
            })??;

        let sub = Subscription {
            _client: client,
            eventloop,
            topic: topic.to_string(),
            done: false,
        };
        Ok(futures::stream::unfold(sub, next_payload).boxed())
    }
}
