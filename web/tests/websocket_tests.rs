//! Live update stream over WebSocket.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic on unexpected frames

mod common;

use axum::http::{header::ORIGIN, HeaderValue, StatusCode};
use common::{as_user, TestApp};
use journey_tracker_core::{Journey, Position, Status, UserId};
use journey_tracker_web::handlers::websocket::JourneyMessage;
use serde_json::json;
use std::time::Duration;

async fn create(app: &TestApp, owner: &str) -> Journey {
    app.harness
        .service
        .create_journey(UserId::new(owner))
        .await
        .unwrap()
}

fn updates_path(journey: &Journey) -> String {
    format!("/api/journeys/{}/updates", journey.id)
}

#[tokio::test]
async fn snapshot_then_updates() {
    let app = TestApp::new();
    let journey = create(&app, "alice").await;

    let mut socket = as_user(app.server.get_websocket(&updates_path(&journey)), "bob")
        .await
        .into_websocket()
        .await;

    let first: JourneyMessage = socket.receive_json().await;
    assert_eq!(first, JourneyMessage::Snapshot { journey: journey.clone() });

    as_user(
        app.server.put(&format!("/api/journeys/{}/position", journey.id)),
        "alice",
    )
    .json(&json!({ "lat": 48.85, "lng": 2.35 }))
    .await
    .assert_status_ok();

    let JourneyMessage::Update { journey: moved } = socket.receive_json().await else {
        panic!("expected an update frame");
    };
    assert_eq!(moved.position, Some(Position::new(48.85, 2.35)));

    as_user(
        app.server.put(&format!("/api/journeys/{}/status", journey.id)),
        "alice",
    )
    .json(&json!({ "status": "COMPLETE" }))
    .await
    .assert_status_ok();

    let JourneyMessage::Update { journey: completed } = socket.receive_json().await else {
        panic!("expected an update frame");
    };
    assert_eq!(completed.status, Status::Complete);
    assert!(completed.position.is_none());
}

#[tokio::test]
async fn anonymous_upgrade_is_unauthorized() {
    let app = TestApp::new();
    let journey = create(&app, "alice").await;

    let response = app.server.get_websocket(&updates_path(&journey)).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(app.harness.bus.inner().topic_count().await, 0);
}

#[tokio::test]
async fn unknown_journey_upgrade_is_not_found() {
    let app = TestApp::new();

    let response = as_user(app.server.get_websocket("/api/journeys/nope/updates"), "bob").await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn foreign_origin_is_forbidden() {
    let app = TestApp::with_allowed_origin(Some("https://track.example.com"));
    let journey = create(&app, "alice").await;

    let response = as_user(app.server.get_websocket(&updates_path(&journey)), "bob")
        .add_header(ORIGIN, HeaderValue::from_static("https://evil.example.com"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn allowed_origin_can_subscribe() {
    let app = TestApp::with_allowed_origin(Some("https://track.example.com"));
    let journey = create(&app, "alice").await;

    let mut socket = as_user(app.server.get_websocket(&updates_path(&journey)), "bob")
        .add_header(ORIGIN, HeaderValue::from_static("https://track.example.com"))
        .await
        .into_websocket()
        .await;

    let first: JourneyMessage = socket.receive_json().await;
    assert_eq!(first, JourneyMessage::Snapshot { journey });
}

#[tokio::test]
async fn closing_the_socket_releases_the_subscription() {
    let app = TestApp::new();
    let journey = create(&app, "alice").await;
    let topic = journey.id.topic().to_string();

    let mut socket = as_user(app.server.get_websocket(&updates_path(&journey)), "bob")
        .await
        .into_websocket()
        .await;
    let _snapshot: JourneyMessage = socket.receive_json().await;
    assert_eq!(app.harness.bus.inner().subscriber_count(&topic).await, 1);

    socket.close().await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while app.harness.bus.inner().subscriber_count(&topic).await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription was not released after close");
}
