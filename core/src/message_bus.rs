//! Message bus abstraction for live journey updates.
//!
//! Every journey has its own topic (named after the journey id). Mutations publish
//! the updated snapshot to that topic after it has been persisted, and each
//! subscriber relays whatever arrives on it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Mutation request │
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ 1. Persist to    │
//! │    repository    │◄─── Source of truth
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ 2. Publish to    │
//! │    topic <id>    │◄─── Fan-out to every subscriber
//! └────────┬─────────┘
//!          │
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │ Sub A │ │ Sub B │
//! └───────┘ └───────┘
//! ```
//!
//! # Payloads
//!
//! Payloads are opaque bytes at this level. The core always publishes JSON journey
//! snapshots and decodes them symmetrically on the subscribing side.
//!
//! # Unsubscribing
//!
//! A subscription is a [`MessageStream`]. Dropping the stream releases the
//! subscription; implementations must stop delivering to it and free any
//! per-subscriber resources.
//!
//! # Implementations
//!
//! - `InMemoryMessageBus` (in `journey-tracker-runtime`): tokio broadcast channel per topic
//! - `RedpandaMessageBus` (in `journey-tracker-redpanda`): Kafka-compatible
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! bus.publish("journey-123", &payload).await?;
//!
//! let mut stream = bus.subscribe("journey-123").await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(payload) => handle(payload),
//!         Err(e) => tracing::warn!(error = %e, "Bus error"),
//!     }
//! }
//! ```

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during message bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageBusError {
    /// Failed to connect to the bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to a topic
    #[error("Subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// The subscriber fell behind and messages were skipped
    #[error("Subscriber lagged, {0} messages skipped")]
    Lagged(u64),

    /// Network or transport error while receiving
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of raw payloads from one topic subscription.
///
/// Each item is either a payload or a transport-level error. Errors do not end the
/// stream; the subscriber decides what to do with them.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, MessageBusError>> + Send>>;

/// Boxed future returned by message bus operations.
pub type MessageBusFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, MessageBusError>> + Send + 'a>>;

/// Per-topic publish/subscribe with fan-out to every current subscriber.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn MessageBus>`.
pub trait MessageBus: Send + Sync {
    /// Publish a payload to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::PublishFailed`] if the bus rejects the message.
    fn publish<'a>(&'a self, topic: &'a str, payload: &'a [u8]) -> MessageBusFuture<'a, ()>;

    /// Subscribe to a topic.
    ///
    /// Once this future resolves, every message published to `topic` is delivered
    /// to the returned stream, in publish order, until the stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::SubscriptionFailed`] if the subscription cannot
    /// be established.
    fn subscribe<'a>(&'a self, topic: &'a str) -> MessageBusFuture<'a, MessageStream>;
}
