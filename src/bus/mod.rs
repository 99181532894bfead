//! Publish/subscribe contract the coordinator is built on.
//!
//! The coordinator only relies on the delivery semantics described here:
//! at-least-once delivery per subscription, explicit acknowledgement, and
//! delayed delivery at or after a requested instant. Any transport offering
//! those semantics can implement [`MessageBus`]; [`memory::InMemoryBus`] is
//! the implementation used by the binary and the test-suite.

pub mod memory;
pub mod subjects;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// Metadata key carrying the correlation identifier of a request/response pair.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Transport-level failures raised by a [`MessageBus`].
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus was shut down; no further messages can be exchanged.
    #[error("message bus is closed")]
    Closed,
    /// A payload could not be serialised into a message.
    #[error("failed to encode payload for `{subject}`")]
    Encode {
        subject: String,
        #[source]
        source: serde_json::Error,
    },
    /// A message payload did not match the expected shape.
    #[error("failed to decode payload received on `{subject}`")]
    Decode {
        subject: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single message travelling over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier, stable across redeliveries.
    pub id: Uuid,
    /// Subject the message was published on.
    pub subject: String,
    /// JSON payload.
    pub payload: serde_json::Value,
    /// Free-form string metadata (correlation identifiers, tracing hints).
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl Message {
    /// Serialise `payload` into a new message addressed to `subject`.
    pub fn json<T: Serialize>(subject: impl Into<String>, payload: &T) -> BusResult<Self> {
        let subject = subject.into();
        let payload = serde_json::to_value(payload).map_err(|source| BusError::Encode {
            subject: subject.clone(),
            source,
        })?;

        Ok(Self {
            id: Uuid::new_v4(),
            subject,
            payload,
            metadata: IndexMap::new(),
        })
    }

    /// Attach a metadata entry, replacing any previous value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a metadata entry.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Correlation identifier echoed by request/response pairs, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata(CORRELATION_ID_KEY)
    }

    /// Decode the JSON payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> BusResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|source| BusError::Decode {
            subject: self.subject.clone(),
            source,
        })
    }
}

/// Settlement hook installed by the transport on every delivery.
pub trait Acknowledge: Send {
    /// The message was consumed and must not be redelivered.
    fn ack(self: Box<Self>);
    /// The message was rejected and should be offered again.
    fn nack(self: Box<Self>);
}

/// A message handed to a subscriber, awaiting acknowledgement.
///
/// Dropping a delivery without settling it counts as an ack.
pub struct Delivery {
    message: Message,
    attempt: u32,
    acker: Option<Box<dyn Acknowledge>>,
}

impl Delivery {
    /// Wrap a message together with the transport's settlement hook.
    pub fn new(message: Message, attempt: u32, acker: Box<dyn Acknowledge>) -> Self {
        Self {
            message,
            attempt,
            acker: Some(acker),
        }
    }

    /// Borrow the delivered message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// 1-based delivery attempt for this message on this subscription.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Positively acknowledge the message.
    pub fn ack(mut self) {
        if let Some(acker) = self.acker.take() {
            acker.ack();
        }
    }

    /// Negatively acknowledge the message so the transport redelivers it.
    pub fn nack(mut self) {
        if let Some(acker) = self.acker.take() {
            acker.nack();
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            trace!(message_id = %self.message.id, "delivery dropped without settlement; acking");
            acker.ack();
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Receiving end of a subject subscription. Dropping it unsubscribes.
pub struct Subscription {
    subject: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    /// Build a subscription from the channel the transport feeds.
    pub fn new(subject: impl Into<String>, receiver: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            subject: subject.into(),
            receiver,
        }
    }

    /// Subject this subscription listens on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the next delivery. `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// Abstraction over the publish/subscribe transport.
pub trait MessageBus: Send + Sync {
    /// Publish a message to every current subscriber of its subject.
    fn publish(&self, message: Message) -> BoxFuture<'static, BusResult<()>>;
    /// Hand a message to the transport for delivery at or after `deliver_at`.
    ///
    /// Returns as soon as the transport accepted the message.
    fn publish_at(
        &self,
        deliver_at: OffsetDateTime,
        message: Message,
    ) -> BoxFuture<'static, BusResult<()>>;
    /// Open a subscription on `subject`.
    fn subscribe(&self, subject: &str) -> BoxFuture<'static, BusResult<Subscription>>;
}
