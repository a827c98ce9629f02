//! Durable journey storage abstraction.
//!
//! The [`JourneyRepository`] trait is the durable source of truth for journeys. The
//! runtime's `JourneyStore` wraps it with per-journey locking and reads through to
//! it on every access; nothing above the store talks to a repository directly.
//!
//! # Implementations
//!
//! - `InMemoryJourneyRepository` (in `journey-tracker-runtime`): in-process table,
//!   used as the sole store in the simple deployment mode and in tests
//! - `PostgresJourneyRepository` (in `journey-tracker-postgres`): one row per journey
//!
//! # Dyn Compatibility
//!
//! Like the message bus, this trait returns `Pin<Box<dyn Future>>` instead of using
//! `async fn` so it can be shared as `Arc<dyn JourneyRepository>`.

use crate::error::JourneyError;
use crate::journey::{Journey, JourneyId, Position, Status};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by repository operations.
pub type RepositoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Errors that can occur during repository operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No journey with this id exists
    #[error("Journey not found: {0}")]
    NotFound(JourneyId),

    /// Generic storage fault (connection, query, decoding)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for JourneyError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::Storage(reason) => {
                tracing::error!(error = %reason, "Journey repository fault");
                Self::Unexpected
            }
        }
    }
}

/// Durable store of one [`Journey`] per id.
///
/// Implementations only need to be individually atomic per call; serialization of
/// read-modify-write sequences for the same journey is the `JourneyStore`'s job.
pub trait JourneyRepository: Send + Sync {
    /// Load a journey.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if the id is unknown, or
    /// [`RepositoryError::Storage`] on a backing-store fault.
    fn get_journey<'a>(&'a self, id: &'a JourneyId) -> RepositoryFuture<'a, Journey>;

    /// Insert a newly created journey.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] if the insert fails.
    fn create_journey<'a>(&'a self, journey: &'a Journey) -> RepositoryFuture<'a, ()>;

    /// Replace the position of a journey (`None` clears it).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if the id is unknown, or
    /// [`RepositoryError::Storage`] on a backing-store fault.
    fn update_position<'a>(
        &'a self,
        id: &'a JourneyId,
        position: Option<Position>,
    ) -> RepositoryFuture<'a, ()>;

    /// Replace the status of a journey.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if the id is unknown, or
    /// [`RepositoryError::Storage`] on a backing-store fault.
    fn update_status<'a>(&'a self, id: &'a JourneyId, status: Status) -> RepositoryFuture<'a, ()>;
}
