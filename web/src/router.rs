//! Router assembly.

use crate::error::AppError;
use crate::handlers::{health, journeys, websocket};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    extract::State,
    http::Method,
    routing::{get, post, put},
    Router,
};
use journey_tracker_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the public router.
///
/// Routes:
/// - `GET /health`
/// - `POST /api/journeys`
/// - `GET /api/journeys/:id`
/// - `PUT /api/journeys/:id/status`
/// - `PUT /api/journeys/:id/position`
/// - `GET /api/journeys/:id/updates` (WebSocket)
///
/// CORS is enabled only for `state.allowed_origin`, when set.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/journeys", post(journeys::create_journey))
        .route("/journeys/:id", get(journeys::get_journey))
        .route("/journeys/:id/status", put(journeys::update_status))
        .route("/journeys/:id/position", put(journeys::update_position))
        .route("/journeys/:id/updates", get(websocket::journey_updates));

    let cors = state.allowed_origin.clone().map(|origin| {
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers(Any)
    });

    let router = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Build the router served on the metrics port.
pub fn metrics_router(metrics: Arc<MetricsServer>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

/// `GET /metrics` in Prometheus text format.
#[allow(clippy::unused_async)] // Axum handler signature requires async
async fn render_metrics(State(metrics): State<Arc<MetricsServer>>) -> Result<String, AppError> {
    metrics
        .render()
        .ok_or_else(|| AppError::unavailable("Metrics recorder not installed"))
}
