//! `PostgreSQL` journey repository for the journey tracker.
//!
//! This crate provides [`PostgresJourneyRepository`], a [`JourneyRepository`] backed
//! by a single `journeys` table:
//!
//! | column    | type               | notes                          |
//! |-----------|--------------------|--------------------------------|
//! | `id`      | `TEXT`             | primary key (journey id)       |
//! | `user_id` | `TEXT`             | owner                          |
//! | `status`  | `TEXT`             | `ACTIVE` or `COMPLETE`         |
//! | `lat`     | `DOUBLE PRECISION` | nullable, null iff `lng` null  |
//! | `lng`     | `DOUBLE PRECISION` | nullable, null iff `lat` null  |
//!
//! Migrations under `migrations/` are embedded and run by [`PostgresJourneyRepository::connect`].
//!
//! # Example
//!
//! ```ignore
//! use journey_tracker_postgres::{PostgresConfig, PostgresJourneyRepository};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PostgresConfig::new("postgres://localhost/journeys");
//!     let repository = PostgresJourneyRepository::connect(&config).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use journey_tracker_core::repository::RepositoryFuture;
use journey_tracker_core::{
    Journey, JourneyId, JourneyRepository, Position, RepositoryError, Status, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

type JourneyRow = (String, String, String, Option<f64>, Option<f64>);

/// Connection settings for [`PostgresJourneyRepository::connect`].
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection string
    pub database_url: String,
    /// Maximum pool size
    pub max_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
}

impl PostgresConfig {
    /// Settings for `database_url` with a pool of 10 and a 30 second timeout.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Journey repository over a `PostgreSQL` pool.
#[derive(Clone, Debug)]
pub struct PostgresJourneyRepository {
    pool: PgPool,
}

impl PostgresJourneyRepository {
    /// Connect, then bring the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] if the connection or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| RepositoryError::Storage(format!("Failed to connect: {e}")))?;

        let repository = Self::from_pool(pool);
        repository.migrate().await?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL journey repository ready"
        );
        Ok(repository)
    }

    /// Wrap an existing pool. The schema is assumed to be migrated.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Storage`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn journey_from_row(row: JourneyRow) -> Result<Journey, RepositoryError> {
    let (id, user_id, status, lat, lng) = row;

    let status = Status::parse(&status)
        .map_err(|_| RepositoryError::Storage(format!("Invalid status for journey {id}: {status}")))?;

    let position = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Position::new(lat, lng)),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Storage(format!(
                "Journey {id} has a half-set position"
            )))
        }
    };

    Ok(Journey {
        id: JourneyId::new(id),
        owner: UserId::new(user_id),
        status,
        position,
    })
}

fn require_row(id: &JourneyId, rows_affected: u64) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        return Err(RepositoryError::NotFound(id.clone()));
    }
    Ok(())
}

impl JourneyRepository for PostgresJourneyRepository {
    fn get_journey<'a>(&'a self, id: &'a JourneyId) -> RepositoryFuture<'a, Journey> {
        Box::pin(async move {
            let row: Option<JourneyRow> = sqlx::query_as(
                "SELECT id, user_id, status, lat, lng FROM journeys WHERE id = $1",
            )
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(format!("Failed to load journey: {e}")))?;

            row.map_or_else(
                || Err(RepositoryError::NotFound(id.clone())),
                journey_from_row,
            )
        })
    }

    fn create_journey<'a>(&'a self, journey: &'a Journey) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO journeys (id, user_id, status, lat, lng) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(journey.id.as_str())
            .bind(journey.owner.as_str())
            .bind(journey.status.as_str())
            .bind(journey.position.map(|p| p.lat))
            .bind(journey.position.map(|p| p.lng))
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(format!("Failed to create journey: {e}")))?;

            tracing::debug!(journey_id = %journey.id, "Journey row inserted");
            Ok(())
        })
    }

    fn update_position<'a>(
        &'a self,
        id: &'a JourneyId,
        position: Option<Position>,
    ) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE journeys SET lat = $2, lng = $3 WHERE id = $1")
                .bind(id.as_str())
                .bind(position.map(|p| p.lat))
                .bind(position.map(|p| p.lng))
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Storage(format!("Failed to update position: {e}")))?;

            require_row(id, result.rows_affected())
        })
    }

    fn update_status<'a>(&'a self, id: &'a JourneyId, status: Status) -> RepositoryFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE journeys SET status = $2 WHERE id = $1")
                .bind(id.as_str())
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Storage(format!("Failed to update status: {e}")))?;

            require_row(id, result.rows_affected())
        })
    }
}
