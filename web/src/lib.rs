//! HTTP and WebSocket surface for the journey tracker.
//!
//! This crate is the imperative shell around `journey-tracker-runtime`:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Axum shell                 │  ← HTTP, JSON, WebSocket
//! │  - Identity resolution (headers)        │  ← Correlation ids, tracing
//! │  - Error → status mapping               │  ← CORS, origin checks
//! ├─────────────────────────────────────────┤
//! │            JourneyService               │
//! │  - Lifecycle decisions                  │
//! │  - Per-journey serialization            │
//! │  - Live update bridge                   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. [`middleware`] assigns a correlation id and opens a request span
//! 2. [`identity::RequestIdentity`] resolves the caller into an explicit `Identity`
//! 3. the handler calls the service with that identity
//! 4. [`AppError`] maps the four failure kinds to 401/404/400/500
//!
//! # Example
//!
//! ```ignore
//! use journey_tracker_web::{build_router, bootstrap::build_service, AppState, Config};
//! use journey_tracker_web::identity::TrustedHeaderIdentity;
//!
//! let config = Config::from_env()?;
//! let service = build_service(&config).await?;
//! let identity = Arc::new(TrustedHeaderIdentity::new(config.identity_header.clone()));
//! let app = build_router(AppState::new(service, identity));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod router;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::AppError;
pub use identity::{IdentityProvider, RequestIdentity, TrustedHeaderIdentity};
pub use middleware::{correlation_id_layer, CorrelationId, CORRELATION_ID_HEADER};
pub use router::{build_router, metrics_router};
pub use state::AppState;
