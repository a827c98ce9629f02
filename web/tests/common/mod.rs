//! Shared setup for router tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(dead_code)] // Not every test binary uses every helper

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use journey_tracker_testing::{init_tracing, TestHarness};
use journey_tracker_web::{build_router, AppState, TrustedHeaderIdentity};
use std::sync::Arc;

/// Header the test server trusts for the caller's subject.
pub fn subject_header() -> HeaderName {
    HeaderName::from_static("x-authenticated-subject")
}

/// A test server over an instrumented harness.
pub struct TestApp {
    pub server: TestServer,
    pub harness: TestHarness,
}

impl TestApp {
    /// Server with no origin restriction.
    pub fn new() -> Self {
        Self::with_allowed_origin(None)
    }

    /// Server that only accepts WebSocket upgrades from `origin`.
    pub fn with_allowed_origin(origin: Option<&'static str>) -> Self {
        init_tracing();
        let harness = TestHarness::new();
        let state = AppState::new(
            harness.service.clone(),
            Arc::new(TrustedHeaderIdentity::new(subject_header())),
        )
        .with_allowed_origin(origin.map(HeaderValue::from_static));

        // WebSocket upgrades need a real HTTP transport
        let server = TestServer::builder()
            .http_transport()
            .build(build_router(state))
            .unwrap();

        Self { server, harness }
    }
}

/// Send `request` as `user`.
pub fn as_user(request: TestRequest, user: &str) -> TestRequest {
    request.add_header(subject_header(), HeaderValue::from_str(user).unwrap())
}
