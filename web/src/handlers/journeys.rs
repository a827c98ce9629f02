//! Journey endpoints.
//!
//! - `POST /api/journeys` - start a journey owned by the caller
//! - `GET /api/journeys/:id` - current snapshot
//! - `PUT /api/journeys/:id/status` - request a status change (owner only)
//! - `PUT /api/journeys/:id/position` - report a position (owner only)
//!
//! The caller's identity comes from [`RequestIdentity`] and is passed explicitly to
//! the service. All bodies are the journey snapshot:
//!
//! ```json
//! {
//!   "id": "2f1c...",
//!   "owner": "alice",
//!   "status": "ACTIVE",
//!   "position": { "lat": 51.5074, "lng": -0.1278 }
//! }
//! ```

use crate::error::AppError;
use crate::identity::RequestIdentity;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use journey_tracker_core::{Journey, JourneyId, Position, Status};
use serde::{Deserialize, Serialize};

/// Body of `PUT /api/journeys/:id/status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusRequest {
    /// Requested status (`ACTIVE` or `COMPLETE`)
    pub status: Status,
}

/// Body of `PUT /api/journeys/:id/position`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionRequest {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl From<PositionRequest> for Position {
    fn from(request: PositionRequest) -> Self {
        Self::new(request.lat, request.lng)
    }
}

/// Start a journey owned by the caller.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/journeys -H "x-authenticated-subject: alice"
/// ```
///
/// # Errors
///
/// - 401 for an anonymous caller
/// - 500 if the journey cannot be stored
pub async fn create_journey(
    State(state): State<AppState>,
    RequestIdentity(identity): RequestIdentity,
) -> Result<(StatusCode, Json<Journey>), AppError> {
    let owner = identity.require()?.clone();
    let journey = state.service.create_journey(owner).await?;
    Ok((StatusCode::CREATED, Json(journey)))
}

/// Current snapshot of a journey. Any authenticated caller may read it.
///
/// # Errors
///
/// - 401 for an anonymous caller
/// - 404 if the journey does not exist
pub async fn get_journey(
    State(state): State<AppState>,
    RequestIdentity(identity): RequestIdentity,
    Path(id): Path<String>,
) -> Result<Json<Journey>, AppError> {
    let journey = state
        .service
        .get_journey(&JourneyId::new(id), &identity)
        .await?;
    Ok(Json(journey))
}

/// Request a status change.
///
/// Requesting the current status, or `ACTIVE` for a completed journey, succeeds and
/// returns the unchanged journey.
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/journeys/$ID/status \
///   -H "x-authenticated-subject: alice" \
///   -H "Content-Type: application/json" \
///   -d '{"status":"COMPLETE"}'
/// ```
///
/// # Errors
///
/// - 401 unless the caller owns the journey
/// - 404 if the journey does not exist
pub async fn update_status(
    State(state): State<AppState>,
    RequestIdentity(identity): RequestIdentity,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Journey>, AppError> {
    let journey = state
        .service
        .update_journey_status(&JourneyId::new(id), &identity, request.status)
        .await?;
    Ok(Json(journey))
}

/// Report the journey's current position.
///
/// # Errors
///
/// - 401 unless the caller owns the journey
/// - 404 if the journey does not exist
/// - 400 if the journey is complete
pub async fn update_position(
    State(state): State<AppState>,
    RequestIdentity(identity): RequestIdentity,
    Path(id): Path<String>,
    Json(request): Json<PositionRequest>,
) -> Result<Json<Journey>, AppError> {
    let journey = state
        .service
        .update_journey_position(&JourneyId::new(id), &identity, request.into())
        .await?;
    Ok(Json(journey))
}
