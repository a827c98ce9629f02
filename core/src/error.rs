//! Error taxonomy returned by every journey operation.
//!
//! There are exactly four failure kinds. Storage and bus faults are logged with
//! full detail where they happen and then collapse into [`JourneyError::Unexpected`],
//! so backing-store details never reach a caller.

use crate::journey::JourneyId;
use thiserror::Error;

/// Failure of a journey operation.
///
/// A no-op transition (requesting the current status, or any status change on a
/// completed journey) is *not* an error; it returns the unchanged journey.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JourneyError {
    /// Missing identity, or the requester does not own the journey
    #[error("Unauthorized")]
    Unauthorized,

    /// No journey with this id exists
    #[error("Journey not found: {0}")]
    NotFound(JourneyId),

    /// The request is not valid for the journey's current state
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Storage or bus fault, or an unrecognized status value
    #[error("Unexpected error")]
    Unexpected,
}

impl JourneyError {
    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unexpected => "UNEXPECTED",
        }
    }
}
