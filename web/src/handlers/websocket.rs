//! Live journey updates over WebSocket.
//!
//! `GET /api/journeys/:id/updates` subscribes before upgrading, so authorization and
//! unknown ids fail as plain HTTP errors (401, 404). Once upgraded:
//!
//! ```text
//! Client              Handler                 JourneyService
//!   │                    │                          │
//!   ├─ Upgrade ─────────>│                          │
//!   │                    ├─ subscribe_journey() ───>│
//!   │<─ 101 ─────────────┤                          │
//!   │<─ snapshot ────────┤<── first item ───────────┤
//!   │<─ update ──────────┤<── later items ──────────┤
//!   │<─ ping (10 s) ─────┤                          │
//!   ├─ Close ───────────>│                          │
//!   │                    ├─ cancel ────────────────>│
//! ```
//!
//! # Message Protocol
//!
//! **Server → Client (first frame):**
//! ```json
//! { "type": "snapshot", "journey": { "id": "...", "owner": "...", "status": "ACTIVE", "position": null } }
//! ```
//!
//! **Server → Client (every later change):**
//! ```json
//! { "type": "update", "journey": { ... } }
//! ```
//!
//! Client frames other than `Close` are ignored.

use crate::error::AppError;
use crate::identity::RequestIdentity;
use crate::middleware::CorrelationId;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{header::ORIGIN, HeaderMap, HeaderValue},
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use journey_tracker_core::{Journey, JourneyId};
use journey_tracker_runtime::JourneySubscription;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Interval between keep-alive pings.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JourneyMessage {
    /// State at subscribe time; always the first frame
    Snapshot {
        /// The journey
        journey: Journey,
    },
    /// A later committed change
    Update {
        /// The journey after the change
        journey: Journey,
    },
}

/// Upgrade to a live update stream for one journey.
///
/// # Errors
///
/// - 403 if `ALLOWED_ORIGIN` is set and the `Origin` header does not match it
/// - 401 for an anonymous caller
/// - 404 if the journey does not exist
pub async fn journey_updates(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    RequestIdentity(identity): RequestIdentity,
    Path(id): Path<String>,
    headers: HeaderMap,
    correlation_id: CorrelationId,
) -> Result<Response, AppError> {
    check_origin(state.allowed_origin.as_ref(), &headers)?;

    let cancel = state.shutdown.child_token();
    let subscription = state
        .service
        .subscribe_journey(&JourneyId::new(id), &identity, cancel.clone())
        .await?;

    let span = tracing::info_span!(
        "journey_updates",
        correlation_id = %correlation_id,
        journey_id = %subscription.journey_id(),
    );
    info!(journey_id = %subscription.journey_id(), "WebSocket subscription requested");

    Ok(ws.on_upgrade(move |socket| stream_journey(socket, subscription, cancel).instrument(span)))
}

/// Reject upgrades from origins other than `allowed`, when one is configured.
fn check_origin(allowed: Option<&HeaderValue>, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(allowed) = allowed else {
        return Ok(());
    };

    let origin = headers.get(ORIGIN);
    if origin == Some(allowed) {
        return Ok(());
    }

    warn!(origin = ?origin, expected = ?allowed, "WebSocket origin does not match expected");
    Err(AppError::forbidden("Origin not allowed"))
}

/// Pump the subscription into the socket until either side ends.
///
/// The token is cancelled on every exit path, which releases the bus subscription.
async fn stream_journey(
    socket: WebSocket,
    mut subscription: JourneySubscription,
    cancel: CancellationToken,
) {
    info!("WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(
        async move {
            let mut keep_alive = interval_at(Instant::now() + KEEP_ALIVE_INTERVAL, KEEP_ALIVE_INTERVAL);
            keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sent_snapshot = false;

            loop {
                let message = tokio::select! {
                    item = subscription.next() => {
                        let Some(journey) = item else {
                            break;
                        };
                        let frame = if sent_snapshot {
                            JourneyMessage::Update { journey }
                        } else {
                            sent_snapshot = true;
                            JourneyMessage::Snapshot { journey }
                        };
                        match serde_json::to_string(&frame) {
                            Ok(json) => Message::Text(json),
                            Err(e) => {
                                error!(error = %e, "Failed to serialize journey");
                                continue;
                            }
                        }
                    }
                    _ = keep_alive.tick() => Message::Ping(Vec::new()),
                };

                if sender.send(message).await.is_err() {
                    debug!("Client disconnected");
                    return;
                }
            }

            // Subscription ended server-side (shutdown)
            let _ = sender.send(Message::Close(None)).await;
            debug!("WebSocket send task terminated");
        }
        .in_current_span(),
    );

    let mut recv_task = tokio::spawn(
        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Close(_) => {
                        info!("Client requested close");
                        break;
                    }
                    Message::Pong(_) => debug!("Received pong"),
                    _ => debug!("Ignoring client message"),
                }
            }
            debug!("WebSocket receive task terminated");
        }
        .in_current_span(),
    );

    tokio::select! {
        _ = (&mut send_task) => {
            debug!("Send task completed, aborting receive task");
            recv_task.abort();
        },
        _ = (&mut recv_task) => {
            debug!("Receive task completed, aborting send task");
            send_task.abort();
        },
    }

    cancel.cancel();
    info!("WebSocket connection closed");
}
