//! Journey domain types.
//!
//! A [`Journey`] is one tracked trip: who owns it, whether it is still running,
//! and (while it is running) where it currently is. The same value doubles as the
//! *snapshot* that is published to subscribers and returned to callers.
//!
//! # Invariants
//!
//! - `id` and `owner` never change after creation
//! - [`Status::Complete`] is terminal
//! - `position` is `None` right after creation and whenever the journey is complete
//!
//! The constructors and the [`lifecycle`](crate::lifecycle) decisions are the only
//! places that produce new journey values, and both uphold these rules.

use crate::error::JourneyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a journey.
///
/// Generated ids are UUID v4 strings, but any non-empty string read back from a
/// repository or a request path is accepted as-is.
///
/// # Examples
///
/// ```
/// use journey_tracker_core::journey::JourneyId;
///
/// let id = JourneyId::new("journey-123");
/// assert_eq!(id.as_str(), "journey-123");
///
/// let generated = JourneyId::generate();
/// assert_ne!(generated, JourneyId::generate());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JourneyId(String);

impl JourneyId {
    /// Create a `JourneyId` from a trusted string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Message bus topic carrying this journey's snapshots.
    ///
    /// There is exactly one topic per journey, named after the id.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JourneyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JourneyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JourneyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for JourneyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque identifier of a user (the validated subject of a request).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a `UserId` from a subject string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Geographic position of a journey.
///
/// Both coordinates are plain floating-point numbers. No range validation is
/// performed here; callers are responsible for sending sensible values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl Position {
    /// Create a new position.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Lifecycle status of a journey.
///
/// `Complete` is absorbing: once reached, no transition out of it is ever applied.
///
/// The wire and storage names are `ACTIVE` and `COMPLETE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The journey is under way and may report positions
    Active,
    /// The journey has finished
    Complete,
}

impl Status {
    /// Storage/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Complete => "COMPLETE",
        }
    }

    /// Parse a status from its storage/wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::Unexpected`] for anything other than `ACTIVE` or
    /// `COMPLETE`. An unknown status is never a client mistake the core can act on,
    /// so it is reported as an internal fault.
    pub fn parse(s: &str) -> Result<Self, JourneyError> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETE" => Ok(Self::Complete),
            other => {
                tracing::error!(status = other, "Unrecognized journey status");
                Err(JourneyError::Unexpected)
            }
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = JourneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A tracked trip and its current state.
///
/// # Examples
///
/// ```
/// use journey_tracker_core::journey::{Journey, Status, UserId};
///
/// let journey = Journey::new(UserId::new("user-1"));
/// assert_eq!(journey.status, Status::Active);
/// assert!(journey.position.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    /// Unique id, assigned at creation
    pub id: JourneyId,
    /// The user who created the journey and the only one allowed to change it
    pub owner: UserId,
    /// Current lifecycle status
    pub status: Status,
    /// Last reported position; `None` until reported and after completion
    pub position: Option<Position>,
}

impl Journey {
    /// Start a new journey for `owner` with a freshly generated id.
    #[must_use]
    pub fn new(owner: UserId) -> Self {
        Self {
            id: JourneyId::generate(),
            owner,
            status: Status::Active,
            position: None,
        }
    }

    /// Whether `user` owns this journey.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }

    /// Whether the journey is still under way.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Encode this journey as a JSON snapshot for the message bus.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::Unexpected`] if serialization fails.
    pub fn to_snapshot(&self) -> Result<Vec<u8>, JourneyError> {
        serde_json::to_vec(self).map_err(|e| {
            tracing::error!(journey_id = %self.id, error = %e, "Failed to encode journey snapshot");
            JourneyError::Unexpected
        })
    }

    /// Decode a JSON snapshot produced by [`Journey::to_snapshot`].
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the payload is not a journey.
    pub fn from_snapshot(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
