//! Resolving the caller's [`Identity`] from a request.
//!
//! Token validation is done upstream (an authenticating gateway or sidecar). The
//! server only maps what that layer forwarded into an [`Identity`] value, which the
//! handlers then pass explicitly to every [`JourneyService`] call. A missing subject is
//! not rejected here: the core decides what anonymous callers may do.
//!
//! [`JourneyService`]: journey_tracker_runtime::JourneyService

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, HeaderName},
};
use journey_tracker_core::{Identity, UserId};
use std::convert::Infallible;
use std::sync::Arc;

/// Maps request headers to an [`Identity`].
pub trait IdentityProvider: Send + Sync {
    /// Identity of the caller that sent `headers`.
    fn resolve(&self, headers: &HeaderMap) -> Identity;
}

/// Trusts a single header set by an authenticating proxy.
///
/// A missing, empty or non-UTF-8 header resolves to [`Identity::Anonymous`].
#[derive(Debug, Clone)]
pub struct TrustedHeaderIdentity {
    header: HeaderName,
}

impl TrustedHeaderIdentity {
    /// Read the subject from `header`.
    #[must_use]
    pub const fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// The header the subject is read from.
    #[must_use]
    pub const fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl IdentityProvider for TrustedHeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Identity {
        let subject = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .map(UserId::new);

        Identity::from(subject)
    }
}

/// Extractor yielding the caller's [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    Arc<dyn IdentityProvider>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let provider = Arc::<dyn IdentityProvider>::from_ref(state);
        Ok(Self(provider.resolve(&parts.headers)))
    }
}
