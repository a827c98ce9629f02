//! Wiring configured backends into a [`JourneyService`].

use crate::config::{BusBackend, Config, StorageBackend};
use anyhow::Context;
use journey_tracker_core::{JourneyRepository, MessageBus};
use journey_tracker_postgres::PostgresJourneyRepository;
use journey_tracker_runtime::{
    BridgeConfig, InMemoryJourneyRepository, InMemoryMessageBus, JourneyService,
};
use std::sync::Arc;

/// Connect the configured repository and bus and build the service.
///
/// # Errors
///
/// Fails if `PostgreSQL` or the broker cannot be reached, or if the redpanda bus is
/// selected in a build without the `redpanda` feature.
pub async fn build_service(config: &Config) -> anyhow::Result<JourneyService> {
    let repository = build_repository(&config.storage).await?;
    let bus = build_bus(&config.bus).await?;

    Ok(JourneyService::new(repository, bus)
        .with_bridge_config(BridgeConfig::with_buffer(config.subscription_buffer)))
}

async fn build_repository(storage: &StorageBackend) -> anyhow::Result<Arc<dyn JourneyRepository>> {
    match storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory journey storage; journeys are lost on restart");
            Ok(Arc::new(InMemoryJourneyRepository::new()))
        }
        StorageBackend::Postgres(postgres) => {
            let repository = PostgresJourneyRepository::connect(postgres)
                .await
                .context("Failed to initialize PostgreSQL journey repository")?;
            Ok(Arc::new(repository))
        }
    }
}

#[allow(clippy::unused_async)] // Only the redpanda backend awaits
async fn build_bus(bus: &BusBackend) -> anyhow::Result<Arc<dyn MessageBus>> {
    match bus {
        BusBackend::Memory { capacity } => {
            tracing::info!(capacity, "Using in-memory message bus");
            Ok(Arc::new(InMemoryMessageBus::with_capacity(*capacity)))
        }
        #[cfg(feature = "redpanda")]
        BusBackend::Redpanda(redpanda) => {
            let bus = journey_tracker_redpanda::RedpandaMessageBus::builder()
                .brokers(&redpanda.brokers)
                .topic(&redpanda.topic)
                .build()
                .context("Failed to create Redpanda message bus")?;
            bus.ensure_topic()
                .await
                .context("Failed to create journey update topic")?;
            tracing::info!(brokers = %redpanda.brokers, topic = %redpanda.topic, "Using Redpanda message bus");
            Ok(Arc::new(bus))
        }
        #[cfg(not(feature = "redpanda"))]
        BusBackend::Redpanda(_) => {
            anyhow::bail!("BUS_BACKEND=redpanda requires a build with the `redpanda` feature")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use journey_tracker_core::{Identity, UserId};

    #[tokio::test]
    async fn memory_backends_build_a_working_service() {
        let config = Config::from_lookup(|_| None).unwrap();
        let service = build_service(&config).await.unwrap();

        let journey = service.create_journey(UserId::new("alice")).await.unwrap();
        let loaded = service
            .get_journey(&journey.id, &Identity::subject("bob"))
            .await
            .unwrap();
        assert_eq!(loaded, journey);
    }

    #[cfg(not(feature = "redpanda"))]
    #[tokio::test]
    async fn redpanda_requires_the_feature() {
        let config = Config::from_lookup(|key| (key == "BUS_BACKEND").then(|| "redpanda".to_string()))
            .unwrap();
        assert!(build_service(&config).await.is_err());
    }
}
