//! In-process backends.
//!
//! [`InMemoryJourneyRepository`] and [`InMemoryMessageBus`] back the single-process
//! deployment and most tests. Neither survives a restart.

use futures::StreamExt;
use journey_tracker_core::message_bus::MessageBusFuture;
use journey_tracker_core::repository::RepositoryFuture;
use journey_tracker_core::{
    Journey, JourneyId, JourneyRepository, MessageBus, MessageBusError, MessageStream,
    Position, RepositoryError, Status,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Default per-topic capacity of [`InMemoryMessageBus`].
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Journey table held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryJourneyRepository {
    journeys: Arc<RwLock<HashMap<JourneyId, Journey>>>,
}

impl InMemoryJourneyRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored journeys.
    pub async fn len(&self) -> usize {
        self.journeys.read().await.len()
    }

    /// Whether no journey has been stored.
    pub async fn is_empty(&self) -> bool {
        self.journeys.read().await.is_empty()
    }
}

impl JourneyRepository for InMemoryJourneyRepository {
    fn get_journey<'a>(&'a self, id: &'a JourneyId) -> RepositoryFuture<'a, Journey> {
        Box::pin(async move {
            self.journeys
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(id.clone()))
        })
    }

    fn create_journey<'a>(&'a self, journey: &'a Journey) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            let mut journeys = self.journeys.write().await;
            if journeys.contains_key(&journey.id) {
                return Err(RepositoryError::Storage(format!(
                    "journey {} already exists",
                    journey.id
                )));
            }
            journeys.insert(journey.id.clone(), journey.clone());
            Ok(())
        })
    }

    fn update_position<'a>(
        &'a self,
        id: &'a JourneyId,
        position: Option<Position>,
    ) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            let mut journeys = self.journeys.write().await;
            let journey = journeys
                .get_mut(id)
                .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
            journey.position = position;
            Ok(())
        })
    }

    fn update_status<'a>(&'a self, id: &'a JourneyId, status: Status) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            let mut journeys = self.journeys.write().await;
            let journey = journeys
                .get_mut(id)
                .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
            journey.status = status;
            Ok(())
        })
    }
}

type Channels = Arc<RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>>;

/// Message bus over one tokio broadcast channel per topic.
///
/// Channels are created by the first subscriber and pruned once they have no
/// receivers left. Publishing to a topic nobody follows is a successful no-op.
/// A subscriber that falls more than `capacity` messages behind receives a
/// [`MessageBusError::Lagged`] item and continues with the newest messages.
#[derive(Clone, Debug)]
pub struct InMemoryMessageBus {
    channels: Channels,
    capacity: usize,
}

impl InMemoryMessageBus {
    /// Create a bus with [`DEFAULT_BUS_CAPACITY`] per topic.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus with the given per-topic capacity (at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscriptions on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .read()
            .await
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Number of topics with a channel.
    pub async fn topic_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for InMemoryMessageBus {
    fn publish<'a>(&'a self, topic: &'a str, payload: &'a [u8]) -> MessageBusFuture<'a, ()> {
        Box::pin(async move {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(topic) {
                // Err only means every receiver is gone
                let delivered = sender.send(payload.to_vec()).unwrap_or(0);
                tracing::trace!(topic, delivered, "Published to in-memory bus");
            }
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> MessageBusFuture<'a, MessageStream> {
        Box::pin(async move {
            let mut channels = self.channels.write().await;
            channels.retain(|_, sender| sender.receiver_count() > 0);

            let capacity = self.capacity;
            let receiver = channels
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(capacity).0)
                .subscribe();

            let stream = BroadcastStream::new(receiver).map(|item| {
                item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| {
                    MessageBusError::Lagged(skipped)
                })
            });

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}
