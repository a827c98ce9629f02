//! The journey lifecycle service.
//!
//! [`JourneyService`] is the single entry point for journey operations. Every call
//! takes the caller's [`Identity`] explicitly. Mutations go through the store's
//! per-journey write lock and publish the new snapshot before releasing it.
//!
//! Creation and mutations run on their own task. Dropping the caller's future only
//! stops waiting for the result; the persist and the publish still complete.

use crate::bridge::{self, BridgeConfig, JourneySubscription};
use crate::store::{JourneyStore, Mutation};
use journey_tracker_core::lifecycle::{decide_position, decide_status};
use journey_tracker_core::{
    Identity, Journey, JourneyError, JourneyId, JourneyRepository, MessageBus, Position,
    Status, UserId,
};
use metrics::counter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Journey operations over a repository and a message bus.
#[derive(Clone)]
pub struct JourneyService {
    store: JourneyStore,
    bus: Arc<dyn MessageBus>,
    bridge: BridgeConfig,
}

impl JourneyService {
    /// Create a service with the default [`BridgeConfig`].
    #[must_use]
    pub fn new(repository: Arc<dyn JourneyRepository>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            store: JourneyStore::new(repository),
            bus,
            bridge: BridgeConfig::default(),
        }
    }

    /// Replace the subscription settings.
    #[must_use]
    pub const fn with_bridge_config(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &JourneyStore {
        &self.store
    }

    /// Start a new `Active` journey owned by `owner`.
    ///
    /// Nothing is published; there is nobody to follow a journey before its id is known.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::Unexpected`] if the journey cannot be persisted.
    pub async fn create_journey(&self, owner: UserId) -> Result<Journey, JourneyError> {
        let store = self.store.clone();
        detached(async move {
            let journey = Journey::new(owner);
            store.create(&journey).await?;

            counter!("journeys_created_total").increment(1);
            tracing::info!(journey_id = %journey.id, owner = %journey.owner, "Journey created");
            Ok(journey)
        })
        .await
    }

    /// Current state of a journey. Any authenticated identity may read it.
    ///
    /// # Errors
    ///
    /// - [`JourneyError::Unauthorized`] for an anonymous identity
    /// - [`JourneyError::NotFound`] if the journey does not exist
    /// - [`JourneyError::Unexpected`] on a storage fault
    pub async fn get_journey(
        &self,
        id: &JourneyId,
        identity: &Identity,
    ) -> Result<Journey, JourneyError> {
        identity.require()?;
        self.store.get(id).await
    }

    /// Request a status change.
    ///
    /// Requesting the current status, or `Active` for a completed journey, leaves the
    /// journey untouched and publishes nothing. Completing an active journey clears
    /// its position.
    ///
    /// # Errors
    ///
    /// - [`JourneyError::Unauthorized`] unless `identity` is the owner
    /// - [`JourneyError::NotFound`] if the journey does not exist
    /// - [`JourneyError::Unexpected`] on a storage or bus fault
    pub async fn update_journey_status(
        &self,
        id: &JourneyId,
        identity: &Identity,
        status: Status,
    ) -> Result<Journey, JourneyError> {
        let requester = identity.require()?.clone();
        let service = self.clone();
        let id = id.clone();
        detached(async move { service.apply_status(&id, &requester, status).await }).await
    }

    async fn apply_status(
        &self,
        id: &JourneyId,
        requester: &UserId,
        status: Status,
    ) -> Result<Journey, JourneyError> {
        let mutation = self
            .store
            .mutate_if_owner(id, requester, |current| Ok(decide_status(current, status)))
            .await?;

        if !mutation.changed {
            counter!("journey_noop_requests_total").increment(1);
            tracing::debug!(journey_id = %id, status = %status, "Status unchanged");
            return Ok(mutation.into_journey());
        }

        counter!("journey_transitions_total", "kind" => "status").increment(1);
        tracing::info!(journey_id = %id, status = %status, "Journey status changed");
        self.publish(mutation).await
    }

    /// Report the journey's current position.
    ///
    /// # Errors
    ///
    /// - [`JourneyError::Unauthorized`] unless `identity` is the owner
    /// - [`JourneyError::NotFound`] if the journey does not exist
    /// - [`JourneyError::BadRequest`] if the journey is not `Active`
    /// - [`JourneyError::Unexpected`] on a storage or bus fault
    pub async fn update_journey_position(
        &self,
        id: &JourneyId,
        identity: &Identity,
        position: Position,
    ) -> Result<Journey, JourneyError> {
        let requester = identity.require()?.clone();
        let service = self.clone();
        let id = id.clone();
        detached(async move { service.apply_position(&id, &requester, position).await }).await
    }

    async fn apply_position(
        &self,
        id: &JourneyId,
        requester: &UserId,
        position: Position,
    ) -> Result<Journey, JourneyError> {
        let mutation = self
            .store
            .mutate_if_owner(id, requester, |current| decide_position(current, position))
            .await?;

        counter!("journey_transitions_total", "kind" => "position").increment(1);
        tracing::debug!(journey_id = %id, lat = position.lat, lng = position.lng, "Journey position updated");
        self.publish(mutation).await
    }

    /// Follow a journey live. See [`bridge`](crate::bridge) for ordering and lifetime.
    ///
    /// # Errors
    ///
    /// - [`JourneyError::Unauthorized`] for an anonymous identity
    /// - [`JourneyError::NotFound`] if the journey does not exist
    /// - [`JourneyError::Unexpected`] on a storage or bus fault
    pub async fn subscribe_journey(
        &self,
        id: &JourneyId,
        identity: &Identity,
        cancel: CancellationToken,
    ) -> Result<JourneySubscription, JourneyError> {
        bridge::subscribe(&self.store, self.bus.as_ref(), self.bridge, id, identity, &cancel).await
    }

    /// Publish the mutated snapshot, then release the journey's lock.
    ///
    /// A failed publish is reported as `Unexpected`; the change itself stays persisted.
    async fn publish(&self, mutation: Mutation) -> Result<Journey, JourneyError> {
        let journey = &mutation.journey;
        let payload = journey.to_snapshot()?;

        if let Err(e) = self.bus.publish(journey.id.topic(), &payload).await {
            counter!("journey_publish_failures_total").increment(1);
            tracing::error!(journey_id = %journey.id, error = %e, "Failed to publish journey update");
            return Err(JourneyError::Unexpected);
        }

        counter!("journey_publishes_total").increment(1);
        Ok(mutation.into_journey())
    }
}

/// Run `operation` on its own task and wait for it.
async fn detached<F>(operation: F) -> Result<Journey, JourneyError>
where
    F: Future<Output = Result<Journey, JourneyError>> + Send + 'static,
{
    match tokio::spawn(operation.in_current_span()).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "Journey operation task failed");
            Err(JourneyError::Unexpected)
        }
    }
}

impl std::fmt::Debug for JourneyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyService")
            .field("store", &self.store)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use crate::memory::{InMemoryJourneyRepository, InMemoryMessageBus};
    use futures::StreamExt;

    fn service() -> (JourneyService, InMemoryMessageBus) {
        let bus = InMemoryMessageBus::new();
        let service = JourneyService::new(
            Arc::new(InMemoryJourneyRepository::new()),
            Arc::new(bus.clone()),
        );
        (service, bus)
    }

    #[tokio::test]
    async fn created_journey_is_active_without_position() {
        let (service, _) = service();
        let journey = service.create_journey(UserId::new("owner")).await.unwrap();

        assert_eq!(journey.status, Status::Active);
        assert!(journey.position.is_none());
        assert_eq!(journey.owner, UserId::new("owner"));

        let read = service
            .get_journey(&journey.id, &Identity::subject("anyone"))
            .await
            .unwrap();
        assert_eq!(read, journey);
    }

    #[tokio::test]
    async fn anonymous_cannot_read() {
        let (service, _) = service();
        let journey = service.create_journey(UserId::new("owner")).await.unwrap();

        let result = service.get_journey(&journey.id, &Identity::Anonymous).await;
        assert_eq!(result, Err(JourneyError::Unauthorized));
    }

    #[tokio::test]
    async fn owner_updates_reach_subscribers() {
        let (service, _) = service();
        let owner = Identity::subject("owner");
        let journey = service.create_journey(UserId::new("owner")).await.unwrap();

        let mut subscription = service
            .subscribe_journey(&journey.id, &Identity::subject("viewer"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(subscription.next().await, Some(journey.clone()));

        let moved = service
            .update_journey_position(&journey.id, &owner, Position::new(1.0, 2.0))
            .await
            .unwrap();
        let completed = service
            .update_journey_status(&journey.id, &owner, Status::Complete)
            .await
            .unwrap();

        assert_eq!(subscription.next().await, Some(moved));
        assert_eq!(subscription.next().await, Some(completed.clone()));
        assert!(completed.position.is_none());
    }

    #[tokio::test]
    async fn position_rejected_after_completion() {
        let (service, _) = service();
        let owner = Identity::subject("owner");
        let journey = service.create_journey(UserId::new("owner")).await.unwrap();
        service
            .update_journey_status(&journey.id, &owner, Status::Complete)
            .await
            .unwrap();

        let result = service
            .update_journey_position(&journey.id, &owner, Position::new(1.0, 1.0))
            .await;
        assert!(matches!(result, Err(JourneyError::BadRequest(_))));
    }

    #[tokio::test]
    async fn unknown_journey_is_not_found() {
        let (service, _) = service();
        let id = JourneyId::new("nope");

        let result = service
            .update_journey_status(&id, &Identity::subject("owner"), Status::Complete)
            .await;
        assert_eq!(result, Err(JourneyError::NotFound(id)));
    }
}
