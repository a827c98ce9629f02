//! Explicit request identity.
//!
//! Token validation happens outside the core. Whatever did it hands the core an
//! [`Identity`] value, and every operation takes that value as a parameter instead
//! of reading it from ambient request context.

use crate::error::JourneyError;
use crate::journey::UserId;

/// The resolved identity of a caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    /// A validated subject
    Subject(UserId),
    /// No validated identity was presented
    Anonymous,
}

impl Identity {
    /// Identity for a validated subject.
    #[must_use]
    pub fn subject(id: impl Into<String>) -> Self {
        Self::Subject(UserId::new(id))
    }

    /// The validated subject.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::Unauthorized`] for [`Identity::Anonymous`].
    pub const fn require(&self) -> Result<&UserId, JourneyError> {
        match self {
            Self::Subject(user) => Ok(user),
            Self::Anonymous => Err(JourneyError::Unauthorized),
        }
    }
}

impl From<Option<UserId>> for Identity {
    fn from(subject: Option<UserId>) -> Self {
        subject.map_or(Self::Anonymous, Self::Subject)
    }
}
