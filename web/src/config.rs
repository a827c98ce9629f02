//! Server configuration.
//!
//! Loaded from environment variables (after reading `.env` if present) with defaults
//! suitable for local development: in-memory storage and bus, port 8080, metrics on
//! port 9090.

use axum::http::{HeaderName, HeaderValue};
use journey_tracker_postgres::PostgresConfig;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default header carrying the authenticated subject.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-authenticated-subject";

/// Default shared Kafka topic.
pub const DEFAULT_REDPANDA_TOPIC: &str = "journey-updates";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable has a value that cannot be parsed
    #[error("Invalid value for {key}: {value}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },

    /// A backend selector names an unknown backend
    #[error("Unknown backend for {key}: {value}")]
    UnknownBackend {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },

    /// A variable required by the selected backend is not set
    #[error("Missing required variable {0}")]
    Missing(&'static str),
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// Prometheus scrape endpoint
    pub metrics: MetricsConfig,
    /// Header the identity provider reads the subject from
    pub identity_header: HeaderName,
    /// Only origin allowed for CORS and WebSocket upgrades; unset disables both checks
    pub allowed_origin: Option<HeaderValue>,
    /// Journey storage
    pub storage: StorageBackend,
    /// Update fan-out
    pub bus: BusBackend,
    /// Per-subscription update buffer
    pub subscription_buffer: usize,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// How long in-flight requests may take to drain on shutdown
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` to bind.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Metrics endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether to install the recorder and serve `/metrics`
    pub enabled: bool,
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl MetricsConfig {
    /// `host:port` to bind.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where journeys are stored.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Process-local map; lost on restart
    Memory,
    /// `PostgreSQL`
    Postgres(PostgresConfig),
}

/// How journey updates fan out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusBackend {
    /// Process-local broadcast channels
    Memory {
        /// Per-topic channel capacity
        capacity: usize,
    },
    /// Redpanda or any Kafka-compatible broker
    Redpanda(RedpandaConfig),
}

/// Broker settings for [`BusBackend::Redpanda`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedpandaConfig {
    /// Comma-separated broker addresses
    pub brokers: String,
    /// Shared Kafka topic carrying every journey's updates
    pub topic: String,
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is malformed, a backend name is unknown,
    /// or `DATABASE_URL` is missing for the postgres backend.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let server = ServerConfig {
            host: vars.string("HOST", "0.0.0.0"),
            port: vars.parse("PORT", 8080)?,
            shutdown_timeout: Duration::from_secs(vars.parse("SHUTDOWN_TIMEOUT", 30)?),
        };

        let metrics = MetricsConfig {
            enabled: vars.parse("METRICS_ENABLED", true)?,
            host: vars.string("METRICS_HOST", "0.0.0.0"),
            port: vars.parse("METRICS_PORT", 9090)?,
        };

        let header = vars.string("IDENTITY_HEADER", DEFAULT_IDENTITY_HEADER);
        let identity_header =
            HeaderName::from_bytes(header.as_bytes()).map_err(|_| ConfigError::Invalid {
                key: "IDENTITY_HEADER",
                value: header.clone(),
            })?;

        let allowed_origin = vars
            .get("ALLOWED_ORIGIN")
            .map(|origin| {
                HeaderValue::from_str(&origin).map_err(|_| ConfigError::Invalid {
                    key: "ALLOWED_ORIGIN",
                    value: origin.clone(),
                })
            })
            .transpose()?;

        let storage = match vars.string("STORAGE_BACKEND", "memory").as_str() {
            "memory" => StorageBackend::Memory,
            "postgres" => {
                let url = vars
                    .get("DATABASE_URL")
                    .ok_or(ConfigError::Missing("DATABASE_URL"))?;
                let mut postgres = PostgresConfig::new(url);
                postgres.max_connections = vars.parse("DATABASE_MAX_CONNECTIONS", 10)?;
                postgres.connect_timeout =
                    Duration::from_secs(vars.parse("DATABASE_CONNECT_TIMEOUT", 30)?);
                StorageBackend::Postgres(postgres)
            }
            other => {
                return Err(ConfigError::UnknownBackend {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let bus = match vars.string("BUS_BACKEND", "memory").as_str() {
            "memory" => BusBackend::Memory {
                capacity: vars.parse("MEMORY_BUS_CAPACITY", 64)?,
            },
            "redpanda" => BusBackend::Redpanda(RedpandaConfig {
                brokers: vars.string("REDPANDA_BROKERS", "localhost:9092"),
                topic: vars.string("REDPANDA_TOPIC", DEFAULT_REDPANDA_TOPIC),
            }),
            other => {
                return Err(ConfigError::UnknownBackend {
                    key: "BUS_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            server,
            metrics,
            identity_header,
            allowed_origin,
            storage,
            bus,
            subscription_buffer: vars.parse("SUBSCRIPTION_BUFFER", 1)?,
        })
    }
}

/// Typed access to a variable source. Empty values count as unset.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        self.get(key).map_or(Ok(default), |value| {
            value.trim().parse().map_err(|_| ConfigError::Invalid { key, value })
        })
    }
}
