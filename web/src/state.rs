//! Application state shared by the HTTP handlers.

use crate::identity::IdentityProvider;
use axum::{extract::FromRef, http::HeaderValue};
use journey_tracker_runtime::JourneyService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State cloned into every handler.
///
/// Cloning is cheap: the service and provider are reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Journey operations
    pub service: JourneyService,
    /// Maps request headers to an identity
    pub identity: Arc<dyn IdentityProvider>,
    /// Only origin allowed to open WebSocket subscriptions, if restricted
    pub allowed_origin: Option<HeaderValue>,
    /// Cancelled on server shutdown; parent of every live subscription's token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State with no origin restriction and a fresh shutdown token.
    #[must_use]
    pub fn new(service: JourneyService, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            service,
            identity,
            allowed_origin: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Restrict WebSocket upgrades to `origin`.
    #[must_use]
    pub fn with_allowed_origin(mut self, origin: Option<HeaderValue>) -> Self {
        self.allowed_origin = origin;
        self
    }

    /// Tie live subscriptions to `shutdown`.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.service)
            .field("allowed_origin", &self.allowed_origin)
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Arc<dyn IdentityProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}
