//! Prometheus metrics for the journey tracker.
//!
//! Counters and gauges are recorded through the `metrics` facade by the service and
//! the update bridge. [`MetricsServer`] installs the Prometheus recorder; the web
//! crate serves [`MetricsServer::render`] on the metrics port.
//!
//! | metric                              | kind    | labels   |
//! |-------------------------------------|---------|----------|
//! | `journeys_created_total`            | counter |          |
//! | `journey_transitions_total`         | counter | `kind`   |
//! | `journey_noop_requests_total`       | counter |          |
//! | `journey_publishes_total`           | counter |          |
//! | `journey_publish_failures_total`    | counter |          |
//! | `journey_subscriptions_active`      | gauge   |          |
//! | `journey_messages_dropped_total`    | counter | `reason` |
//!
//! # Example
//!
//! ```rust,no_run
//! use journey_tracker_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

pub use metrics::{counter, gauge};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr` (e.g. `0.0.0.0:9090`).
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder cannot be installed. A
    /// recorder installed earlier in the same process is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the scrape endpoint should be served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("journeys_created_total", "Total number of journeys created");
    describe_counter!(
        "journey_transitions_total",
        "Journey mutations that changed state, by kind (status, position)"
    );
    describe_counter!(
        "journey_noop_requests_total",
        "Status requests that left the journey unchanged"
    );
    describe_counter!(
        "journey_publishes_total",
        "Journey snapshots published to the message bus"
    );
    describe_counter!(
        "journey_publish_failures_total",
        "Journey snapshots the message bus rejected"
    );
    describe_gauge!(
        "journey_subscriptions_active",
        "Live journey update subscriptions"
    );
    describe_counter!(
        "journey_messages_dropped_total",
        "Bus messages a subscription skipped, by reason (decode, foreign, lagged, transport)"
    );
}
