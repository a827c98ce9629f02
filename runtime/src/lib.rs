//! # Journey Tracker Runtime
//!
//! Runtime pieces that coordinate the pure core with storage and the message bus.
//!
//! ## Core Components
//!
//! - **`JourneyService`**: create, read, status/position changes, live subscriptions
//! - **`JourneyStore`**: per-journey read/write locking over a repository
//! - **Update bridge**: turns a bus topic into a cancellable stream of snapshots
//! - **In-memory backends**: repository and message bus for single-process use and tests
//! - **Metrics**: Prometheus recorder and metric descriptions
//!
//! ## Example
//!
//! ```ignore
//! use journey_tracker_runtime::{InMemoryJourneyRepository, InMemoryMessageBus, JourneyService};
//! use journey_tracker_core::{Identity, Status, UserId};
//! use std::sync::Arc;
//!
//! let service = JourneyService::new(
//!     Arc::new(InMemoryJourneyRepository::new()),
//!     Arc::new(InMemoryMessageBus::new()),
//! );
//!
//! let journey = service.create_journey(UserId::new("alice")).await?;
//! service
//!     .update_journey_status(&journey.id, &Identity::subject("alice"), Status::Complete)
//!     .await?;
//! ```

#![forbid(unsafe_code)]

pub mod bridge;
pub mod memory;
pub mod metrics;
pub mod service;
pub mod store;

pub use bridge::{BridgeConfig, JourneySubscription};
pub use memory::{InMemoryJourneyRepository, InMemoryMessageBus};
pub use service::JourneyService;
pub use store::{JourneyStore, Mutation};
