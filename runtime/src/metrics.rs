//! Prometheus metrics for page transitions.
//!
//! Runners record through the recorder types below; nothing is exported
//! unless a [`MetricsServer`] (or another `metrics` recorder) is installed.
//!
//! # Example
//!
//! ```rust,no_run
//! use pageflow_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use pageflow_core::error::Phase;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics exporter.
///
/// Installs the recorder and renders its output. It does not listen on
/// [`MetricsServer::addr`]: the host application owns the HTTP stack and
/// serves [`MetricsServer::render`] at that address.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint is served on by the host
    ///   application (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed, host application serves /metrics"
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

    /// Address the host application serves the scrape endpoint on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_histogram!(
        "page_phase_duration_seconds",
        "Time taken by a page lifecycle operation"
    );
    describe_counter!(
        "page_phase_errors_total",
        "Total number of lifecycle operations that reported an error"
    );
    describe_counter!(
        "page_transitions_total",
        "Total number of finished transitions by runner and outcome"
    );
    describe_counter!(
        "page_partial_renders_total",
        "Total number of out-of-band renders triggered while handling"
    );
    describe_counter!(
        "page_rerenders_total",
        "Total number of rerender requests by outcome"
    );
}

/// Page transition metrics recorder.
pub struct TransitionMetrics;

impl TransitionMetrics {
    /// Record a completed lifecycle operation.
    pub fn record_phase(phase: Phase, duration: Duration) {
        histogram!("page_phase_duration_seconds", "phase" => phase.as_str())
            .record(duration.as_secs_f64());
    }

    /// Record a lifecycle operation that failed.
    pub fn record_phase_error(phase: Phase) {
        counter!("page_phase_errors_total", "phase" => phase.as_str()).increment(1);
    }

    /// Record how a transition ended (`rendered`, `superseded`, ...).
    pub fn record_outcome(runner: &'static str, outcome: &'static str) {
        counter!("page_transitions_total", "runner" => runner, "outcome" => outcome).increment(1);
    }

    /// Record a partial render.
    pub fn record_partial_render() {
        counter!("page_partial_renders_total").increment(1);
    }

    /// Record a rerender request outcome.
    pub fn record_rerender(outcome: &'static str) {
        counter!("page_rerenders_total", "outcome" => outcome).increment(1);
    }
}
