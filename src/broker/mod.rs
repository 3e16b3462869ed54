//! Inbound Broker Feed
//!
//! The pipeline consumes `InboundMessage`s from a channel; what fills
//! the channel is a collaborator. Tests and embedders publish directly
//! through [`BrokerPublisher`]; the `mqtt` feature adds a real
//! subscriber (see `broker::mqtt`) that forwards matching publishes
//! into the same channel.

#[cfg(feature = "mqtt")]
pub mod mqtt;

use bytes::Bytes;
use tokio::sync::mpsc;

/// One message from the broker: topic plus raw UTF-8 JSON payload
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Topic the producer published on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Receiving side of the broker feed
pub struct BrokerFeed {
    rx: mpsc::Receiver<InboundMessage>,
}

impl BrokerFeed {
    /// Next message, or None when every publisher is gone
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

/// Publishing side of the broker feed (tests, embedding, adapters)
#[derive(Clone)]
pub struct BrokerPublisher {
    tx: mpsc::Sender<InboundMessage>,
}

impl BrokerPublisher {
    /// Publish a message into the feed. Awaits channel capacity; fails
    /// only when the feed side has been dropped.
    pub async fn publish(&self, message: InboundMessage) -> Result<(), InboundMessage> {
        self.tx.send(message).await.map_err(|e| e.0)
    }
}

/// Create an in-process broker feed with the given channel capacity
pub fn feed(capacity: usize) -> (BrokerPublisher, BrokerFeed) {
    let (tx, rx) = mpsc::channel(capacity);
    (BrokerPublisher { tx }, BrokerFeed { rx })
}

/// MQTT-style topic matching: `+` matches one level, `#` matches the
/// rest of the topic (only valid as the final level).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (pattern_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(p), Some(t)) if p == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
