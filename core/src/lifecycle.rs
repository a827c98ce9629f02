//! Pure lifecycle decisions.
//!
//! Given the current journey and a requested change, these functions decide what
//! the new journey is and whether anything has to be persisted and published.
//! They perform no I/O and take no locks; the runtime's `JourneyService` wires them
//! between loading, authorization, persistence and publishing.
//!
//! # Status transitions
//!
//! | current  | requested | result                                   |
//! |----------|-----------|------------------------------------------|
//! | any      | same      | unchanged                                |
//! | Complete | Active    | unchanged (complete is terminal)         |
//! | Active   | Complete  | status = Complete, position cleared      |
//!
//! Equality and terminal absorption are checked first, so repeated or
//! late-arriving requests are idempotent and safe to retry.

use crate::error::JourneyError;
use crate::journey::{Journey, Position, Status};

/// Outcome of a lifecycle decision.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// Nothing changes: no persist, no publish
    Unchanged,
    /// The journey moves to this new state: persist, then publish it
    Changed(Journey),
}

impl Transition {
    /// Whether this transition changes the journey.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Decide the effect of a status change request.
///
/// Never fails: every `(current, requested)` pair of the closed [`Status`] enum has
/// a defined outcome. Unknown status values are rejected earlier, when they are
/// parsed.
#[must_use]
pub fn decide_status(current: &Journey, requested: Status) -> Transition {
    match (current.status, requested) {
        (Status::Active, Status::Active) | (Status::Complete, _) => Transition::Unchanged,
        (Status::Active, Status::Complete) => Transition::Changed(Journey {
            status: Status::Complete,
            position: None,
            ..current.clone()
        }),
    }
}

/// Decide the effect of a position report.
///
/// # Errors
///
/// Returns [`JourneyError::BadRequest`] when the journey is not active; a completed
/// journey never carries a position.
pub fn decide_position(current: &Journey, position: Position) -> Result<Transition, JourneyError> {
    if !current.is_active() {
        return Err(JourneyError::BadRequest(format!(
            "journey {} is {}, position can only be set while ACTIVE",
            current.id, current.status
        )));
    }

    Ok(Transition::Changed(Journey {
        position: Some(position),
        ..current.clone()
    }))
}
