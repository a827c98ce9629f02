//! Live journey updates.
//!
//! [`subscribe`] turns a message bus topic into a [`JourneySubscription`]: a stream
//! of journey snapshots whose first item is the state at subscribe time, followed by
//! every update published afterwards.
//!
//! # Ordering
//!
//! The bus subscription is opened and the snapshot read while holding the journey's
//! read lock. Mutations publish while holding the write lock, so every update is
//! either already part of the snapshot or arrives on the bus after it.
//!
//! # Lifetime
//!
//! A relay task forwards decoded snapshots into a bounded channel. It runs until the
//! caller's [`CancellationToken`] is cancelled or the subscription is dropped, then
//! drops the bus stream, which releases the bus subscription. The task does not stop
//! when the bus stream ends on its own; the subscription stays open until cancelled.
//!
//! # Back-pressure
//!
//! The relay blocks while the channel is full. With the default capacity of 1 a slow
//! consumer holds back its own relay task only; on the in-memory bus a consumer that
//! falls far enough behind sees a lag and skips ahead.

use crate::store::JourneyStore;
use futures::{Stream, StreamExt};
use journey_tracker_core::{
    Identity, Journey, JourneyError, JourneyId, MessageBus, MessageBusError, MessageStream,
};
use metrics::{counter, gauge};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Default capacity of the per-subscription channel.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 1;

/// Subscription tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Capacity of the channel between the relay task and the consumer (at least 1)
    pub buffer: usize,
}

impl BridgeConfig {
    /// Config with the given channel capacity.
    #[must_use]
    pub const fn with_buffer(buffer: usize) -> Self {
        Self { buffer }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}

/// Stream of snapshots for one journey.
///
/// Yields the subscribe-time snapshot first, then published updates in publish order.
/// Updates are not guaranteed to be complete: a consumer that falls behind the bus
/// (a lag on the in-memory bus) skips the updates it missed and resumes with newer
/// ones. Each update is a full snapshot, so the latest item is always current.
///
/// Ends after the caller's token is cancelled. Dropping it cancels the relay task.
#[derive(Debug)]
pub struct JourneySubscription {
    journey_id: JourneyId,
    initial: Option<Journey>,
    updates: mpsc::Receiver<Journey>,
    _cancel_on_drop: DropGuard,
}

impl JourneySubscription {
    /// Id of the followed journey.
    #[must_use]
    pub const fn journey_id(&self) -> &JourneyId {
        &self.journey_id
    }
}

impl Stream for JourneySubscription {
    type Item = Journey;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(initial) = self.initial.take() {
            return Poll::Ready(Some(initial));
        }
        self.updates.poll_recv(cx)
    }
}

/// Open a live subscription to a journey.
///
/// Any authenticated identity may follow any journey.
///
/// # Errors
///
/// - [`JourneyError::Unauthorized`] for an anonymous identity
/// - [`JourneyError::NotFound`] if the journey does not exist
/// - [`JourneyError::Unexpected`] if the bus subscription or the snapshot read fails
pub async fn subscribe(
    store: &JourneyStore,
    bus: &dyn MessageBus,
    config: BridgeConfig,
    id: &JourneyId,
    identity: &Identity,
    cancel: &CancellationToken,
) -> Result<JourneySubscription, JourneyError> {
    let subscriber = identity.require()?;

    let (messages, initial) = {
        let _guard = store.read_lock(id).await;
        let messages = bus.subscribe(id.topic()).await.map_err(|e| {
            tracing::error!(journey_id = %id, error = %e, "Failed to subscribe to journey topic");
            JourneyError::Unexpected
        })?;
        let initial = store.load(id).await?;
        (messages, initial)
    };

    let (tx, rx) = mpsc::channel(config.buffer.max(1));
    let token = cancel.child_token();
    tokio::spawn(relay(id.clone(), messages, tx, token.clone()));

    tracing::info!(journey_id = %id, subscriber = %subscriber, "Journey subscription opened");

    Ok(JourneySubscription {
        journey_id: id.clone(),
        initial: Some(initial),
        updates: rx,
        _cancel_on_drop: token.drop_guard(),
    })
}

async fn relay(
    journey_id: JourneyId,
    mut messages: MessageStream,
    tx: mpsc::Sender<Journey>,
    cancel: CancellationToken,
) {
    gauge!("journey_subscriptions_active").increment(1.0);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = messages.next() => match item {
                Some(Ok(payload)) => {
                    let Some(journey) = decode(&journey_id, &payload) else {
                        continue;
                    };
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        sent = tx.send(journey) => if sent.is_err() {
                            break;
                        },
                    }
                }
                Some(Err(e)) => {
                    let reason = match e {
                        MessageBusError::Lagged(_) => "lagged",
                        _ => "transport",
                    };
                    counter!("journey_messages_dropped_total", "reason" => reason).increment(1);
                    tracing::warn!(journey_id = %journey_id, error = %e, "Journey update lost on the bus");
                }
                None => {
                    tracing::debug!(journey_id = %journey_id, "Bus stream ended, waiting for cancellation");
                    cancel.cancelled().await;
                    break;
                }
            },
        }
    }

    drop(messages);
    gauge!("journey_subscriptions_active").decrement(1.0);
    tracing::info!(journey_id = %journey_id, "Journey subscription closed");
}

fn decode(journey_id: &JourneyId, payload: &[u8]) -> Option<Journey> {
    match Journey::from_snapshot(payload) {
        Ok(journey) if journey.id == *journey_id => Some(journey),
        Ok(journey) => {
            counter!("journey_messages_dropped_total", "reason" => "foreign").increment(1);
            tracing::warn!(
                journey_id = %journey_id,
                received_id = %journey.id,
                "Dropped snapshot for another journey"
            );
            None
        }
        Err(e) => {
            counter!("journey_messages_dropped_total", "reason" => "decode").increment(1);
            tracing::warn!(journey_id = %journey_id, error = %e, "Dropped undecodable journey update");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use crate::memory::{InMemoryJourneyRepository, InMemoryMessageBus};
    use journey_tracker_core::{Position, UserId};
    use std::sync::Arc;
    use std::time::Duration;

    async fn setup() -> (JourneyStore, InMemoryMessageBus, Journey) {
        let store = JourneyStore::new(Arc::new(InMemoryJourneyRepository::new()));
        let bus = InMemoryMessageBus::new();
        let journey = Journey::new(UserId::new("owner"));
        store.create(&journey).await.unwrap();
        (store, bus, journey)
    }

    async fn next(subscription: &mut JourneySubscription) -> Option<Journey> {
        tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .expect("subscription stalled")
    }

    #[tokio::test]
    async fn anonymous_cannot_subscribe() {
        let (store, bus, journey) = setup().await;
        let result = subscribe(
            &store,
            &bus,
            BridgeConfig::default(),
            &journey.id,
            &Identity::Anonymous,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(JourneyError::Unauthorized)));
        assert_eq!(bus.subscriber_count(journey.id.topic()).await, 0);
    }

    #[tokio::test]
    async fn unknown_journey_releases_the_bus_subscription() {
        let (store, bus, _) = setup().await;
        let id = JourneyId::new("missing");

        let result = subscribe(
            &store,
            &bus,
            BridgeConfig::default(),
            &id,
            &Identity::subject("viewer"),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.err(), Some(JourneyError::NotFound(id.clone())));
        assert_eq!(bus.subscriber_count(id.topic()).await, 0);
    }

    #[tokio::test]
    async fn garbage_and_foreign_payloads_are_skipped() {
        let (store, bus, journey) = setup().await;
        let cancel = CancellationToken::new();
        let mut subscription = subscribe(
            &store,
            &bus,
            BridgeConfig::default(),
            &journey.id,
            &Identity::subject("viewer"),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(next(&mut subscription).await, Some(journey.clone()));

        let foreign = Journey::new(UserId::new("someone-else"));
        let mut moved = journey.clone();
        moved.position = Some(Position::new(3.0, 4.0));

        bus.publish(journey.id.topic(), b"not json").await.unwrap();
        bus.publish(journey.id.topic(), &foreign.to_snapshot().unwrap())
            .await
            .unwrap();
        bus.publish(journey.id.topic(), &moved.to_snapshot().unwrap())
            .await
            .unwrap();

        assert_eq!(next(&mut subscription).await, Some(moved));
    }

    #[tokio::test]
    async fn lagging_subscription_skips_to_newer_updates() {
        let store = JourneyStore::new(Arc::new(InMemoryJourneyRepository::new()));
        let bus = InMemoryMessageBus::with_capacity(1);
        let journey = Journey::new(UserId::new("owner"));
        store.create(&journey).await.unwrap();

        let mut subscription = subscribe(
            &store,
            &bus,
            BridgeConfig::default(),
            &journey.id,
            &Identity::subject("viewer"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        // The relay has not run yet, so the bus only retains the newest update
        let updates: Vec<Journey> = (0..3)
            .map(|i| {
                let mut moved = journey.clone();
                moved.position = Some(Position::new(f64::from(i), 0.0));
                moved
            })
            .collect();
        for update in &updates {
            bus.publish(journey.id.topic(), &update.to_snapshot().unwrap())
                .await
                .unwrap();
        }

        assert_eq!(next(&mut subscription).await, Some(journey.clone()));
        assert_eq!(next(&mut subscription).await, updates.last().cloned());

        let mut later = journey.clone();
        later.position = Some(Position::new(9.0, 9.0));
        bus.publish(journey.id.topic(), &later.to_snapshot().unwrap())
            .await
            .unwrap();
        assert_eq!(next(&mut subscription).await, Some(later));
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream_and_unsubscribes() {
        let (store, bus, journey) = setup().await;
        let cancel = CancellationToken::new();
        let mut subscription = subscribe(
            &store,
            &bus,
            BridgeConfig::default(),
            &journey.id,
            &Identity::subject("viewer"),
            &cancel,
        )
        .await
        .unwrap();
        assert!(next(&mut subscription).await.is_some());
        assert_eq!(bus.subscriber_count(journey.id.topic()).await, 1);

        cancel.cancel();

        assert_eq!(next(&mut subscription).await, None);
        assert_eq!(bus.subscriber_count(journey.id.topic()).await, 0);
    }

    #[tokio::test]
    async fn dropping_the_subscription_unsubscribes() {
        let (store, bus, journey) = setup().await;
        let subscription = subscribe(
            &store,
            &bus,
            BridgeConfig::default(),
            &journey.id,
            &Identity::subject("viewer"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(bus.subscriber_count(journey.id.topic()).await, 1);

        drop(subscription);

        tokio::time::timeout(Duration::from_secs(1), async {
            while bus.subscriber_count(journey.id.topic()).await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("relay task kept the bus subscription");
    }

    #[test]
    fn default_buffer_is_one() {
        assert_eq!(BridgeConfig::default().buffer, 1);
        assert_eq!(BridgeConfig::with_buffer(8).buffer, 8);
    }
}
