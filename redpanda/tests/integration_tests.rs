//! Integration tests for [`RedpandaMessageBus`] with a real Kafka instance.
//!
//! These tests use testcontainers to spin up Kafka and validate:
//! - Publish/subscribe round-trip on a logical topic
//! - Filtering of other journeys' records
//! - Fan-out to every subscriber
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they require Docker and
//! take a while to start Kafka. To run explicitly:
//! ```bash
//! cargo test -p journey-tracker-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use journey_tracker_core::{MessageBus, MessageStream};
use journey_tracker_redpanda::RedpandaMessageBus;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{Kafka, KAFKA_PORT};

/// Start Kafka and return a bus whose shared topic exists.
async fn setup_bus(topic: &str) -> (ContainerAsync<Kafka>, RedpandaMessageBus) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "false")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    let bus = RedpandaMessageBus::builder()
        .brokers(&brokers)
        .topic(topic)
        .topic_layout(3, 1)
        .build()
        .expect("Failed to create message bus");

    for attempt in 1..=60 {
        if bus.ensure_topic().await.is_ok() {
            // Let topic metadata propagate
            tokio::time::sleep(Duration::from_secs(2)).await;
            return (kafka, bus);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Kafka failed to become ready");
    }
    unreachable!("loop either returns or panics")
}

async fn next_payload(stream: &mut MessageStream) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(15), stream.next())
        .await
        .expect("Timeout waiting for record")
        .expect("Stream ended")
        .expect("Transport error")
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Docker"]
async fn test_publish_and_subscribe_round_trip() {
    let (_kafka, bus) = setup_bus("journey-updates-roundtrip").await;

    let mut stream = bus.subscribe("journey-1").await.expect("Failed to subscribe");

    bus.publish("journey-1", b"first").await.expect("Failed to publish");
    bus.publish("journey-1", b"second").await.expect("Failed to publish");

    assert_eq!(next_payload(&mut stream).await, b"first");
    assert_eq!(next_payload(&mut stream).await, b"second");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Docker"]
async fn test_other_journeys_are_filtered_out() {
    let (_kafka, bus) = setup_bus("journey-updates-filter").await;

    let mut stream = bus.subscribe("journey-1").await.expect("Failed to subscribe");

    bus.publish("journey-2", b"not mine").await.expect("Failed to publish");
    bus.publish("journey-1", b"mine").await.expect("Failed to publish");

    assert_eq!(next_payload(&mut stream).await, b"mine");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Docker"]
async fn test_every_subscriber_receives_every_record() {
    let (_kafka, bus) = setup_bus("journey-updates-fanout").await;

    let mut first = bus.subscribe("journey-1").await.expect("Failed to subscribe");
    let mut second = bus.subscribe("journey-1").await.expect("Failed to subscribe");

    bus.publish("journey-1", b"hello").await.expect("Failed to publish");

    assert_eq!(next_payload(&mut first).await, b"hello");
    assert_eq!(next_payload(&mut second).await, b"hello");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Docker"]
async fn test_records_before_subscribe_are_not_replayed() {
    let (_kafka, bus) = setup_bus("journey-updates-latest").await;

    bus.publish("journey-1", b"old").await.expect("Failed to publish");
    let mut stream = bus.subscribe("journey-1").await.expect("Failed to subscribe");
    bus.publish("journey-1", b"new").await.expect("Failed to publish");

    assert_eq!(next_payload(&mut stream).await, b"new");
}
