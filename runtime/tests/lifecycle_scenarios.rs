//! End-to-end lifecycle scenarios against the service.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use futures::StreamExt;
use journey_tracker_core::{Identity, JourneyError, Position, Status, UserId};
use journey_tracker_testing::{init_tracing, test_identity, RepositoryOp, TestHarness};
use proptest::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn create_starts_active_without_position() {
    init_tracing();
    let harness = TestHarness::new();

    let journey = harness.create_journey("user-1").await;

    assert_eq!(journey.status, Status::Active);
    assert_eq!(journey.owner, UserId::new("user-1"));
    assert!(journey.position.is_none());
    assert_eq!(harness.bus.publish_count(), 0);
}

#[tokio::test]
async fn full_lifecycle_publishes_each_change_once() {
    let harness = TestHarness::new();
    let owner = test_identity("user-1");
    let journey = harness.create_journey("user-1").await;

    // Position report
    let moved = harness
        .service
        .update_journey_position(&journey.id, &owner, Position::new(51.5, -0.1))
        .await
        .unwrap();
    assert_eq!(moved.status, Status::Active);
    assert_eq!(moved.position, Some(Position::new(51.5, -0.1)));
    assert_eq!(harness.bus.publish_count(), 1);

    // Completion clears position
    let completed = harness
        .service
        .update_journey_status(&journey.id, &owner, Status::Complete)
        .await
        .unwrap();
    assert_eq!(completed.status, Status::Complete);
    assert!(completed.position.is_none());
    assert_eq!(harness.bus.publish_count(), 2);

    let published = harness.bus.published_journeys(journey.id.topic());
    assert_eq!(published, vec![moved, completed.clone()]);

    // Reactivation is absorbed
    let absorbed = harness
        .service
        .update_journey_status(&journey.id, &owner, Status::Active)
        .await
        .unwrap();
    assert_eq!(absorbed, completed);
    assert_eq!(harness.bus.publish_count(), 2);
}

#[tokio::test]
async fn same_status_is_a_silent_noop() {
    let harness = TestHarness::new();
    let journey = harness.create_journey("user-1").await;

    let unchanged = harness
        .service
        .update_journey_status(&journey.id, &test_identity("user-1"), Status::Active)
        .await
        .unwrap();

    assert_eq!(unchanged, journey);
    assert_eq!(harness.bus.publish_count(), 0);
}

#[tokio::test]
async fn non_owner_changes_nothing() {
    let harness = TestHarness::new();
    let journey = harness.create_journey("user-1").await;
    let intruder = test_identity("user-2");

    let position = harness
        .service
        .update_journey_position(&journey.id, &intruder, Position::new(0.0, 0.0))
        .await;
    let status = harness
        .service
        .update_journey_status(&journey.id, &intruder, Status::Complete)
        .await;

    assert_eq!(position, Err(JourneyError::Unauthorized));
    assert_eq!(status, Err(JourneyError::Unauthorized));
    assert_eq!(harness.repository.stored(&journey.id).await, Some(journey));
    assert_eq!(harness.bus.publish_count(), 0);
}

#[tokio::test]
async fn anonymous_mutations_are_unauthorized() {
    let harness = TestHarness::new();
    let journey = harness.create_journey("user-1").await;

    let result = harness
        .service
        .update_journey_status(&journey.id, &Identity::Anonymous, Status::Complete)
        .await;

    assert_eq!(result, Err(JourneyError::Unauthorized));
}

#[tokio::test]
async fn storage_faults_surface_as_unexpected() {
    let harness = TestHarness::new();
    let journey = harness.create_journey("user-1").await;

    harness.repository.fail_on(RepositoryOp::Get);
    let read = harness
        .service
        .get_journey(&journey.id, &test_identity("user-1"))
        .await;
    assert_eq!(read, Err(JourneyError::Unexpected));

    harness.repository.heal();
    harness.repository.fail_on(RepositoryOp::Create);
    let created = harness.service.create_journey(UserId::new("user-1")).await;
    assert_eq!(created, Err(JourneyError::Unexpected));
}

#[tokio::test]
async fn failed_status_write_never_leaves_complete_with_position() {
    let harness = TestHarness::new();
    let owner = test_identity("user-1");
    let journey = harness.create_journey("user-1").await;
    harness
        .service
        .update_journey_position(&journey.id, &owner, Position::new(1.0, 1.0))
        .await
        .unwrap();
    harness.bus.clear();

    harness.repository.fail_on(RepositoryOp::UpdateStatus);
    let result = harness
        .service
        .update_journey_status(&journey.id, &owner, Status::Complete)
        .await;

    assert_eq!(result, Err(JourneyError::Unexpected));
    let stored = harness.repository.stored(&journey.id).await.unwrap();
    assert!(stored.position.is_none() || stored.status == Status::Active);
    assert_eq!(harness.bus.publish_count(), 0);
}

#[tokio::test]
async fn failed_publish_keeps_the_persisted_change() {
    let harness = TestHarness::new();
    let owner = test_identity("user-1");
    let journey = harness.create_journey("user-1").await;

    harness.bus.fail_publishes(true);
    let result = harness
        .service
        .update_journey_status(&journey.id, &owner, Status::Complete)
        .await;

    assert_eq!(result, Err(JourneyError::Unexpected));
    let stored = harness.repository.stored(&journey.id).await.unwrap();
    assert_eq!(stored.status, Status::Complete);
}

#[tokio::test]
async fn abandoned_request_still_publishes_its_change() {
    let harness = TestHarness::new();
    let owner = test_identity("user-1");
    let journey = harness.create_journey("user-1").await;
    let mut subscription = harness
        .service
        .subscribe_journey(&journey.id, &test_identity("user-2"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(subscription.next().await, Some(journey.clone()));

    // The caller gives up while the publish is still in flight
    harness.bus.delay_publishes(Duration::from_millis(200));
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        harness
            .service
            .update_journey_status(&journey.id, &owner, Status::Complete),
    )
    .await;
    assert!(abandoned.is_err());

    let update = tokio::time::timeout(Duration::from_secs(2), subscription.next())
        .await
        .expect("persisted change was never published")
        .unwrap();
    assert_eq!(update.status, Status::Complete);
    assert_eq!(harness.bus.publish_count(), 1);
    assert_eq!(
        harness.repository.stored(&journey.id).await.unwrap().status,
        Status::Complete
    );
}

#[tokio::test]
async fn subscriber_sees_snapshot_then_each_publish_until_cancelled() {
    let harness = TestHarness::new();
    let owner = test_identity("user-1");
    let journey = harness.create_journey("user-1").await;
    let cancel = CancellationToken::new();

    let mut subscription = harness
        .service
        .subscribe_journey(&journey.id, &test_identity("user-3"), cancel.clone())
        .await
        .unwrap();

    let moved = harness
        .service
        .update_journey_position(&journey.id, &owner, Position::new(51.5, -0.1))
        .await
        .unwrap();
    let completed = harness
        .service
        .update_journey_status(&journey.id, &owner, Status::Complete)
        .await
        .unwrap();

    let within = Duration::from_secs(1);
    assert_eq!(tokio::time::timeout(within, subscription.next()).await.unwrap(), Some(journey));
    assert_eq!(tokio::time::timeout(within, subscription.next()).await.unwrap(), Some(moved));
    assert_eq!(tokio::time::timeout(within, subscription.next()).await.unwrap(), Some(completed));

    cancel.cancel();
    assert_eq!(tokio::time::timeout(within, subscription.next()).await.unwrap(), None);
    assert_eq!(harness.bus.inner().subscriber_count(subscription.journey_id().topic()).await, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Completed journeys stay completed and never carry a position, whatever the owner asks.
    #[test]
    fn completion_is_terminal(
        statuses in proptest::collection::vec(journey_tracker_testing::properties::arb_status(), 1..10),
        positions in proptest::collection::vec(journey_tracker_testing::properties::arb_position(), 0..5),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let harness = TestHarness::new();
            let owner = test_identity("owner");
            let journey = harness.create_journey("owner").await;
            harness
                .service
                .update_journey_status(&journey.id, &owner, Status::Complete)
                .await
                .unwrap();
            let publishes = harness.bus.publish_count();

            for status in statuses {
                let after = harness
                    .service
                    .update_journey_status(&journey.id, &owner, status)
                    .await
                    .unwrap();
                assert_eq!(after.status, Status::Complete);
                assert!(after.position.is_none());
            }
            for position in positions {
                let result = harness
                    .service
                    .update_journey_position(&journey.id, &owner, position)
                    .await;
                assert!(matches!(result, Err(JourneyError::BadRequest(_))));
            }

            assert_eq!(harness.bus.publish_count(), publishes);
        });
    }
}
