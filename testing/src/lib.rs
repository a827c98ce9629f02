//! # Journey Tracker Testing
//!
//! Testing utilities for the journey tracker.
//!
//! This crate provides:
//! - Instrumented backends ([`RecordingMessageBus`], [`FailingJourneyRepository`])
//! - Fixtures for identities and journeys
//! - [`TestHarness`], a service wired to instrumented in-memory backends
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use journey_tracker_testing::{TestHarness, test_identity};
//! use journey_tracker_core::Status;
//!
//! #[tokio::test]
//! async fn completing_publishes_once() {
//!     let harness = TestHarness::new();
//!     let journey = harness.create_journey("alice").await;
//!
//!     harness
//!         .service
//!         .update_journey_status(&journey.id, &test_identity("alice"), Status::Complete)
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(harness.bus.publish_count(), 1);
//! }
//! ```

pub mod mocks;

pub use mocks::{FailingJourneyRepository, RecordingMessageBus, RepositoryOp};

/// Identity and journey fixtures.
pub mod fixtures {
    use journey_tracker_core::{Identity, Journey, JourneyId, Status, UserId};

    /// An authenticated identity for `subject`.
    #[must_use]
    pub fn test_identity(subject: &str) -> Identity {
        Identity::subject(subject)
    }

    /// An active journey with a fixed id, owned by `owner`, without position.
    #[must_use]
    pub fn journey_fixture(owner: &str) -> Journey {
        Journey {
            id: JourneyId::new(format!("journey-of-{owner}")),
            owner: UserId::new(owner),
            status: Status::Active,
            position: None,
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use journey_tracker_core::{Position, Status};
    use proptest::prelude::*;

    /// Any status.
    pub fn arb_status() -> impl Strategy<Value = Status> {
        prop_oneof![Just(Status::Active), Just(Status::Complete)]
    }

    /// Any valid WGS84 coordinate pair.
    pub fn arb_position() -> impl Strategy<Value = Position> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| Position::new(lat, lng))
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::sync::Once;

    static TRACING: Once = Once::new();

    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honours `RUST_LOG`; output is captured by the test harness.
    pub fn init_tracing() {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "journey_tracker=debug".into()),
                )
                .with_test_writer()
                .try_init();
        });
    }
}

mod harness {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
    #![allow(clippy::missing_panics_doc)]

    use crate::mocks::{FailingJourneyRepository, RecordingMessageBus};
    use journey_tracker_core::{Journey, UserId};
    use journey_tracker_runtime::{BridgeConfig, JourneyService};
    use std::sync::Arc;

    /// A [`JourneyService`] over instrumented in-memory backends.
    ///
    /// The backends are exposed so tests can inject faults and inspect publishes.
    #[derive(Clone, Debug)]
    pub struct TestHarness {
        /// The service under test
        pub service: JourneyService,
        /// Its repository
        pub repository: FailingJourneyRepository,
        /// Its message bus
        pub bus: RecordingMessageBus,
    }

    impl TestHarness {
        /// Harness with the default subscription buffer.
        #[must_use]
        pub fn new() -> Self {
            Self::with_bridge_config(BridgeConfig::default())
        }

        /// Harness with custom subscription settings.
        #[must_use]
        pub fn with_bridge_config(config: BridgeConfig) -> Self {
            let repository = FailingJourneyRepository::new();
            let bus = RecordingMessageBus::new();
            let service = JourneyService::new(Arc::new(repository.clone()), Arc::new(bus.clone()))
                .with_bridge_config(config);
            Self {
                service,
                repository,
                bus,
            }
        }

        /// Create a journey owned by `owner`.
        pub async fn create_journey(&self, owner: &str) -> Journey {
            self.service.create_journey(UserId::new(owner)).await.unwrap()
        }
    }

    impl Default for TestHarness {
        fn default() -> Self {
            Self::new()
        }
    }
}

pub use fixtures::{journey_fixture, test_identity};
pub use harness::TestHarness;
pub use helpers::init_tracing;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use journey_tracker_core::Status;

    #[test]
    fn fixture_is_active_and_owned() {
        let journey = journey_fixture("alice");
        assert_eq!(journey.status, Status::Active);
        assert!(journey.is_owned_by(&"alice".into()));
        assert!(journey.position.is_none());
    }

    #[tokio::test]
    async fn harness_creates_without_publishing() {
        init_tracing();
        let harness = TestHarness::new();
        let journey = harness.create_journey("alice").await;

        assert_eq!(harness.repository.stored(&journey.id).await, Some(journey));
        assert_eq!(harness.bus.publish_count(), 0);
    }
}
