//! Health check endpoint.
//!
//! Used by load balancers and orchestrators as a liveness probe. It does not touch
//! storage or the bus.

use axum::Json;
use serde::{Deserialize, Serialize};

/// Liveness response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: String,
    /// Server version
    pub version: String,
}

/// `GET /health`
///
/// ```json
/// { "status": "ok", "version": "0.1.0" }
/// ```
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
