//! # Journey Tracker Core
//!
//! Core types, traits and decisions for the journey tracker.
//!
//! A *journey* is a real-world trip owned by one user. Its owner moves it through a
//! small lifecycle (`Active` → `Complete`) and reports positions while it is active;
//! any authenticated user may follow it live.
//!
//! ## Contents
//!
//! - [`journey`]: domain types ([`Journey`], [`JourneyId`], [`UserId`], [`Position`], [`Status`])
//! - [`identity`]: the explicit [`Identity`] passed into every operation
//! - [`error`]: the four-kind [`JourneyError`] taxonomy
//! - [`lifecycle`]: pure status/position transition decisions
//! - [`repository`]: the durable storage trait ([`JourneyRepository`])
//! - [`message_bus`]: the per-journey publish/subscribe trait ([`MessageBus`])
//!
//! ## Architecture Principles
//!
//! - Decisions are pure; I/O lives behind the repository and bus traits
//! - Identity is a value, never ambient context
//! - Internal faults are logged where they happen and surface as `Unexpected`
//!
//! Runtime pieces (locking, orchestration, live subscriptions) live in
//! `journey-tracker-runtime`.

#![forbid(unsafe_code)]

pub mod error;
pub mod identity;
pub mod journey;
pub mod lifecycle;
pub mod message_bus;
pub mod repository;

pub use error::JourneyError;
pub use identity::Identity;
pub use journey::{Journey, JourneyId, Position, Status, UserId};
pub use lifecycle::Transition;
pub use message_bus::{MessageBus, MessageBusError, MessageStream};
pub use repository::{JourneyRepository, RepositoryError};
