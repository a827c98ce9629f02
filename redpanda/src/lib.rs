//! Redpanda message bus for journey tracker live updates.
//!
//! This crate provides [`RedpandaMessageBus`], a [`MessageBus`] that lets several
//! journey tracker instances share live updates through Redpanda (or any
//! Kafka-compatible broker) using rdkafka.
//!
//! # Topic Mapping
//!
//! Journey topics are logical. All of them share one Kafka topic (default
//! `journey-updates`) and the logical topic (the journey id) is the record key:
//!
//! ```text
//!  publish("j-42", snapshot)
//!           │
//!           ▼
//! ┌──────────────────────────┐
//! │ Kafka topic              │
//! │ journey-updates          │   key = "j-42", value = snapshot
//! │ partition = hash("j-42") │◄── one partition per journey: ordered
//! └────────────┬─────────────┘
//!              │
//!       ┌──────┴──────┐
//!       ▼             ▼
//!  ┌─────────┐   ┌─────────┐
//!  │ sub j-42│   │ sub j-7 │   each subscription reads every partition
//!  │ keeps   │   │ drops   │   and keeps records with its own key
//!  └─────────┘   └─────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! Every subscription has its own consumer, so every subscriber sees every record
//! (fan-out, no load balancing). The consumer is assigned all partitions at their
//! current end offsets before [`MessageBus::subscribe`] returns, so every record
//! published after that point is delivered. Nothing is committed; a subscription
//! never resumes after it is dropped.
//!
//! # Example
//!
//! ```no_run
//! use journey_tracker_redpanda::RedpandaMessageBus;
//! use journey_tracker_core::MessageBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaMessageBus::new("localhost:9092")?;
//! bus.ensure_topic().await?;
//!
//! let mut stream = bus.subscribe("journey-123").await?;
//! bus.publish("journey-123", br#"{"id":"journey-123"}"#).await?;
//!
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(payload) => println!("Received {} bytes", payload.len()),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use futures::StreamExt;
use journey_tracker_core::message_bus::MessageBusFuture;
use journey_tracker_core::{MessageBus, MessageBusError, MessageStream};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use std::time::Duration;

/// Default Kafka topic carrying every journey update.
pub const DEFAULT_TOPIC: &str = "journey-updates";

/// Redpanda-backed message bus.
///
/// # Configuration
///
/// - **Brokers**: bootstrap servers (required)
/// - **Topic**: the shared Kafka topic (default `journey-updates`)
/// - **Timeout**: producer send and metadata timeout (default 5 seconds)
/// - **Buffer size**: records buffered per subscription (default 16)
/// - **Partitions / replication**: used by [`ensure_topic`](Self::ensure_topic)
///
/// # Example
///
/// ```no_run
/// use journey_tracker_redpanda::RedpandaMessageBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedpandaMessageBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .topic("journey-updates")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaMessageBus {
    /// Kafka producer for publishing snapshots
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Shared Kafka topic
    topic: String,
    /// Producer and metadata timeout
    timeout: Duration,
    /// Per-subscription buffer
    buffer_size: usize,
    /// Partition count for `ensure_topic`
    partitions: i32,
    /// Replication factor for `ensure_topic`
    replication: i32,
}

impl RedpandaMessageBus {
    /// Create a bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, MessageBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the bus.
    #[must_use]
    pub fn builder() -> RedpandaMessageBusBuilder {
        RedpandaMessageBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// The shared Kafka topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Create the shared Kafka topic if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::ConnectionFailed`] if the admin request fails for
    /// any reason other than the topic already existing.
    pub async fn ensure_topic(&self) -> Result<(), MessageBusError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| {
                MessageBusError::ConnectionFailed(format!("Failed to create admin client: {e}"))
            })?;

        let new_topic = NewTopic::new(
            &self.topic,
            self.partitions,
            TopicReplication::Fixed(self.replication),
        );
        let options = AdminOptions::new().operation_timeout(Some(self.timeout));

        let results = admin
            .create_topics([&new_topic], &options)
            .await
            .map_err(|e| MessageBusError::ConnectionFailed(format!("Failed to create topic: {e}")))?;

        for result in results {
            match result {
                Ok(name) => tracing::info!(topic = %name, "Created journey update topic"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::debug!(topic = %name, "Journey update topic already exists");
                }
                Err((name, code)) => {
                    return Err(MessageBusError::ConnectionFailed(format!(
                        "Failed to create topic {name}: {code}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Create a consumer assigned to every partition of `kafka_topic` at its end offset.
///
/// Blocks on metadata and watermark requests.
fn create_consumer(
    brokers: &str,
    kafka_topic: &str,
    timeout: Duration,
    topic: &str,
) -> Result<StreamConsumer, MessageBusError> {
    let group = format!("journey-tracker-{}", uuid::Uuid::new_v4());
    let subscription_failed = |reason: String| MessageBusError::SubscriptionFailed {
        topic: topic.to_string(),
        reason,
    };

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", &group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "latest")
        .set("session.timeout.ms", "6000")
        .set("enable.partition.eof", "false")
        .create()
        .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

    let metadata = consumer
        .fetch_metadata(Some(kafka_topic), timeout)
        .map_err(|e| subscription_failed(format!("Failed to fetch metadata: {e}")))?;

    let partitions: Vec<i32> = metadata
        .topics()
        .iter()
        .filter(|t| t.name() == kafka_topic)
        .flat_map(|t| t.partitions().iter().map(|p| p.id()))
        .collect();
    if partitions.is_empty() {
        return Err(subscription_failed(format!(
            "Kafka topic {kafka_topic} has no partitions"
        )));
    }

    // Start at the current end of every partition
    let mut assignment = TopicPartitionList::new();
    for partition in partitions {
        let (_, high) = consumer
            .fetch_watermarks(kafka_topic, partition, timeout)
            .map_err(|e| subscription_failed(format!("Failed to fetch offsets: {e}")))?;
        assignment
            .add_partition_offset(kafka_topic, partition, Offset::Offset(high))
            .map_err(|e| subscription_failed(format!("Failed to build assignment: {e}")))?;
    }
    consumer
        .assign(&assignment)
        .map_err(|e| subscription_failed(format!("Failed to assign partitions: {e}")))?;

    tracing::info!(
        topic = %topic,
        kafka_topic = %kafka_topic,
        consumer_group = %group,
        partitions = assignment.count(),
        "Subscribed to journey updates"
    );
    Ok(consumer)
}

/// Builder for configuring a [`RedpandaMessageBus`].
#[derive(Default)]
pub struct RedpandaMessageBusBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    buffer_size: Option<usize>,
    partitions: Option<i32>,
    replication: Option<i32>,
}

impl RedpandaMessageBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the shared Kafka topic.
    ///
    /// Default: `journey-updates`
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the producer send and metadata timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how many records a subscription buffers ahead of its reader.
    ///
    /// Values below 1 are raised to 1. Default: 16
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set the partition count and replication factor used by
    /// [`RedpandaMessageBus::ensure_topic`].
    ///
    /// Default: 3 partitions, replication 1
    #[must_use]
    pub const fn topic_layout(mut self, partitions: i32, replication: i32) -> Self {
        self.partitions = Some(partitions);
        self.replication = Some(replication);
        self
    }

    /// Build the [`RedpandaMessageBus`].
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    pub fn build(self) -> Result<RedpandaMessageBus, MessageBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            MessageBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let topic = self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .create()
            .map_err(|e| {
                MessageBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let buffer_size = self.buffer_size.unwrap_or(16);
        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            acks = %acks,
            buffer_size,
            "RedpandaMessageBus created successfully"
        );

        Ok(RedpandaMessageBus {
            producer,
            brokers,
            topic,
            timeout,
            buffer_size,
            partitions: self.partitions.unwrap_or(3),
            replication: self.replication.unwrap_or(1),
        })
    }
}

impl MessageBus for RedpandaMessageBus {
    fn publish<'a>(&'a self, topic: &'a str, payload: &'a [u8]) -> MessageBusFuture<'a, ()> {
        Box::pin(async move {
            let record = FutureRecord::to(&self.topic).key(topic).payload(payload);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        "Journey update published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(topic = %topic, error = %kafka_error, "Failed to publish journey update");
                    Err(MessageBusError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> MessageBusFuture<'a, MessageStream> {
        Box::pin(async move {
            let key = topic.to_string();
            let consumer = {
                let brokers = self.brokers.clone();
                let kafka_topic = self.topic.clone();
                let timeout = self.timeout;
                let key = key.clone();
                tokio::task::spawn_blocking(move || {
                    create_consumer(&brokers, &kafka_topic, timeout, &key)
                })
                .await
                .map_err(|e| MessageBusError::SubscriptionFailed {
                    topic: topic.to_string(),
                    reason: format!("Consumer setup task failed: {e}"),
                })??
            };
            let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);

            // The task owns the consumer; it stops once the stream is dropped
            tokio::spawn(async move {
                let mut records = consumer.stream();

                loop {
                    let item = tokio::select! {
                        () = tx.closed() => break,
                        next = records.next() => match next {
                            Some(item) => item,
                            None => break,
                        },
                    };

                    let forwarded = match item {
                        Ok(message) if message.key() != Some(key.as_bytes()) => continue,
                        Ok(message) => match message.payload() {
                            Some(payload) => {
                                tracing::trace!(
                                    topic = %key,
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    "Received journey update"
                                );
                                Ok(payload.to_vec())
                            }
                            None => Err(MessageBusError::TransportError(
                                "Record has no payload".to_string(),
                            )),
                        },
                        Err(e) => Err(MessageBusError::TransportError(format!(
                            "Failed to receive message: {e}"
                        ))),
                    };

                    if tx.send(forwarded).await.is_err() {
                        break;
                    }
                }

                tracing::debug!(topic = %key, "Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_message_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaMessageBus>();
        assert_sync::<RedpandaMessageBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaMessageBus::builder().build();
        assert!(matches!(result, Err(MessageBusError::ConnectionFailed(_))));
    }

    #[test]
    fn builder_defaults() {
        // Producer creation does not contact the broker
        let Ok(bus) = RedpandaMessageBus::builder().brokers("localhost:9092").build() else {
            return;
        };
        assert_eq!(bus.topic(), DEFAULT_TOPIC);
        assert_eq!(bus.brokers(), "localhost:9092");
        assert_eq!(bus.buffer_size, 16);
    }
}
