//! Message bus — the seam between chat surfaces and the agent loop.
//!
//! Channels publish `InboundMessage`s onto the bus; the agent loop consumes
//! them one at a time and publishes `OutboundMessage`s back. The bus is the
//! only coupling between the two sides: channel adapters never see the loop,
//! the loop never sees a platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};

use crate::error::BusError;

/// A message received from a chat surface, immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Origin channel name (e.g. "cli", "telegram", "system")
    pub channel: String,

    /// Sender identifier within the channel
    pub sender_id: String,

    /// The chat/group/DM identifier within the channel
    pub chat_id: String,

    /// The text content
    pub content: String,

    /// Attached media references (paths or URLs)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,

    /// When the message was received
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// The session key this message resolves to: `<channel>:<chat_id>`.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A response addressed back to a chat surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Destination channel name
    pub channel: String,

    /// Destination chat identifier within the channel
    pub chat_id: String,

    /// The text content
    pub content: String,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }
}

/// In-process message bus backed by bounded mpsc queues.
///
/// Consuming suspends until a message is available; callers that need a poll
/// boundary (the agent loop does, to observe its stop flag) wrap the consume
/// in `tokio::time::timeout`.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
}

const QUEUE_CAPACITY: usize = 256;

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<(), BusError> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|e| BusError::Closed(e.to_string()))
    }

    /// Wait for the next inbound message.
    pub async fn consume_inbound(&self) -> Result<InboundMessage, BusError> {
        self.inbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| BusError::Closed("inbound queue closed".into()))
    }

    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<(), BusError> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|e| BusError::Closed(e.to_string()))
    }

    /// Wait for the next outbound message.
    pub async fn consume_outbound(&self) -> Result<OutboundMessage, BusError> {
        self.outbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| BusError::Closed("outbound queue closed".into()))
    }

    /// Take an outbound message without waiting, if one is queued.
    pub async fn try_consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.try_recv().ok()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_joins_channel_and_chat() {
        let msg = InboundMessage::new("telegram", "u1", "chat42", "hi");
        assert_eq!(msg.session_key(), "telegram:chat42");
    }

    #[tokio::test]
    async fn inbound_roundtrip() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundMessage::new("cli", "user", "direct", "hello"))
            .await
            .unwrap();
        let msg = bus.consume_inbound().await.unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.channel, "cli");
    }

    #[tokio::test]
    async fn outbound_roundtrip() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundMessage::new("cli", "direct", "reply"))
            .await
            .unwrap();
        let msg = bus.consume_outbound().await.unwrap();
        assert_eq!(msg.content, "reply");
    }

    #[tokio::test]
    async fn consume_inbound_suspends_until_published() {
        use std::sync::Arc;
        let bus = Arc::new(MessageBus::new());
        let consumer = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.consume_inbound().await.unwrap().content })
        };
        // Give the consumer a chance to park before publishing
        tokio::task::yield_now().await;
        bus.publish_inbound(InboundMessage::new("cli", "u", "c", "late"))
            .await
            .unwrap();
        assert_eq!(consumer.await.unwrap(), "late");
    }

    #[tokio::test]
    async fn try_consume_outbound_empty() {
        let bus = MessageBus::new();
        assert!(bus.try_consume_outbound().await.is_none());
    }
}
