//! Instrumented backends for tests.
//!
//! - [`RecordingMessageBus`]: in-memory bus that records every publish and can be
//!   told to reject or delay them
//! - [`FailingJourneyRepository`]: in-memory repository with per-operation fault
//!   injection

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use journey_tracker_core::message_bus::MessageBusFuture;
use journey_tracker_core::repository::RepositoryFuture;
use journey_tracker_core::{
    Journey, JourneyId, JourneyRepository, MessageBus, MessageBusError, MessageStream,
    Position, RepositoryError, Status,
};
use journey_tracker_runtime::{InMemoryJourneyRepository, InMemoryMessageBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A message bus that remembers what was published.
///
/// Delivery is delegated to an [`InMemoryMessageBus`], so subscriptions behave
/// exactly as in production single-process mode.
///
/// # Example
///
/// ```
/// use journey_tracker_testing::mocks::RecordingMessageBus;
/// use journey_tracker_core::MessageBus;
///
/// # tokio_test::block_on(async {
/// let bus = RecordingMessageBus::new();
/// bus.publish("journey-1", b"payload").await.unwrap();
/// assert_eq!(bus.publish_count(), 1);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingMessageBus {
    inner: InMemoryMessageBus,
    published: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
    fail_publishes: Arc<AtomicBool>,
    publish_delay: Arc<RwLock<Option<Duration>>>,
}

impl RecordingMessageBus {
    /// Create a bus that accepts every publish.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (`true`) or succeed again (`false`).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Hold every subsequent publish for `delay` before delivering it.
    pub fn delay_publishes(&self, delay: Duration) {
        *self.publish_delay.write().unwrap() = Some(delay);
    }

    /// Number of accepted publishes.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.published.read().unwrap().len()
    }

    /// Accepted publishes as `(topic, payload)` pairs, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.read().unwrap().clone()
    }

    /// Accepted publishes on one topic, decoded as journey snapshots.
    #[must_use]
    pub fn published_journeys(&self, topic: &str) -> Vec<Journey> {
        self.published
            .read()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, payload)| Journey::from_snapshot(payload).ok())
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.published.write().unwrap().clear();
    }

    /// The delivering bus, for subscriber-count assertions.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryMessageBus {
        &self.inner
    }
}

impl MessageBus for RecordingMessageBus {
    fn publish<'a>(&'a self, topic: &'a str, payload: &'a [u8]) -> MessageBusFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_publishes.load(Ordering::SeqCst) {
                return Err(MessageBusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            let delay = *self.publish_delay.read().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.published
                .write()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
            self.inner.publish(topic, payload).await
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> MessageBusFuture<'a, MessageStream> {
        self.inner.subscribe(topic)
    }
}

/// Repository operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryOp {
    /// `get_journey`
    Get,
    /// `create_journey`
    Create,
    /// `update_position`
    UpdatePosition,
    /// `update_status`
    UpdateStatus,
}

/// In-memory repository with fault injection.
///
/// Every operation succeeds against the wrapped [`InMemoryJourneyRepository`]
/// unless it was marked with [`fail_on`](Self::fail_on), in which case it returns
/// [`RepositoryError::Storage`] without touching the data.
#[derive(Clone, Debug, Default)]
pub struct FailingJourneyRepository {
    inner: InMemoryJourneyRepository,
    failing: Arc<RwLock<Vec<RepositoryOp>>>,
}

impl FailingJourneyRepository {
    /// Create a repository with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail from now on.
    pub fn fail_on(&self, op: RepositoryOp) {
        let mut failing = self.failing.write().unwrap();
        if !failing.contains(&op) {
            failing.push(op);
        }
    }

    /// Remove every injected fault.
    pub fn heal(&self) {
        self.failing.write().unwrap().clear();
    }

    /// Read the stored journey, bypassing fault injection.
    pub async fn stored(&self, id: &JourneyId) -> Option<Journey> {
        self.inner.get_journey(id).await.ok()
    }

    fn check(&self, op: RepositoryOp) -> Result<(), RepositoryError> {
        if self.failing.read().unwrap().contains(&op) {
            return Err(RepositoryError::Storage(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

impl JourneyRepository for FailingJourneyRepository {
    fn get_journey<'a>(&'a self, id: &'a JourneyId) -> RepositoryFuture<'a, Journey> {
        Box::pin(async move {
            self.check(RepositoryOp::Get)?;
            self.inner.get_journey(id).await
        })
    }

    fn create_journey<'a>(&'a self, journey: &'a Journey) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            self.check(RepositoryOp::Create)?;
            self.inner.create_journey(journey).await
        })
    }

    fn update_position<'a>(
        &'a self,
        id: &'a JourneyId,
        position: Option<Position>,
    ) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            self.check(RepositoryOp::UpdatePosition)?;
            self.inner.update_position(id, position).await
        })
    }

    fn update_status<'a>(&'a self, id: &'a JourneyId, status: Status) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            self.check(RepositoryOp::UpdateStatus)?;
            self.inner.update_status(id, status).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journey_tracker_core::UserId;

    #[tokio::test]
    async fn recording_bus_rejects_when_told() {
        let bus = RecordingMessageBus::new();
        bus.fail_publishes(true);

        let result = bus.publish("topic", b"x").await;
        assert!(matches!(result, Err(MessageBusError::PublishFailed { .. })));
        assert_eq!(bus.publish_count(), 0);

        bus.fail_publishes(false);
        bus.publish("topic", b"x").await.unwrap();
        assert_eq!(bus.published(), vec![("topic".to_string(), b"x".to_vec())]);
    }

    #[tokio::test]
    async fn failing_repository_leaves_data_untouched() {
        let repository = FailingJourneyRepository::new();
        let journey = Journey::new(UserId::new("owner"));
        repository.create_journey(&journey).await.unwrap();

        repository.fail_on(RepositoryOp::UpdateStatus);
        let result = repository.update_status(&journey.id, Status::Complete).await;
        assert!(matches!(result, Err(RepositoryError::Storage(_))));
        assert_eq!(repository.stored(&journey.id).await.unwrap().status, Status::Active);

        repository.heal();
        repository.update_status(&journey.id, Status::Complete).await.unwrap();
        assert_eq!(repository.stored(&journey.id).await.unwrap().status, Status::Complete);
    }
}
