//! Prometheus metrics for the ledger RPC service.
//!
//! [`MetricsExporter::install`] registers descriptions and installs the global
//! recorder; the transport layer serves [`MetricsExporter::render`] on `/metrics`.
//! The recorder structs below are plain functions over the `metrics` macros and
//! are no-ops when no recorder is installed.
//!
//! # Example
//!
//! ```rust,no_run
//! use ledger_rpc_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//! let _body = exporter.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

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

/// Installs the Prometheus recorder and renders its output.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// An exporter with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A second installation in the same process (tests) is logged and
    /// ignored; [`render`](Self::render) then returns `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // RPC
    describe_counter!("rpc_calls_total", "Total number of RPC calls by method and shape");
    describe_counter!("rpc_errors_total", "Total number of RPC calls that ended with a non-OK status");
    describe_counter!(
        "rpc_stream_messages_sent_total",
        "Total number of application messages sent on streaming calls"
    );
    describe_histogram!("rpc_call_duration_seconds", "Time from call start to final status");

    // Ledger
    describe_counter!("ledger_transactions_total", "Total number of committed transactions by type");
    describe_counter!("transfers_total", "Total number of transfer attempts by outcome");

    // Fault injection
    describe_counter!("resiliency_faults_total", "Total number of fault draws by status code");
}

/// RPC call metrics recorder.
pub struct RpcMetrics;

impl RpcMetrics {
    /// Record a call start.
    pub fn record_call(method: &'static str, shape: &'static str) {
        counter!("rpc_calls_total", "method" => method, "shape" => shape).increment(1);
    }

    /// Record a call that ended with a non-OK status.
    pub fn record_error(method: &'static str, code: &'static str) {
        counter!("rpc_errors_total", "method" => method, "code" => code).increment(1);
    }

    /// Record one streamed message.
    pub fn record_message_sent(method: &'static str) {
        counter!("rpc_stream_messages_sent_total", "method" => method).increment(1);
    }

    /// Record call duration.
    pub fn record_duration(method: &'static str, duration: Duration) {
        histogram!("rpc_call_duration_seconds", "method" => method).record(duration.as_secs_f64());
    }
}

/// Ledger metrics recorder.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// Record a committed transaction.
    pub fn record_transaction(transaction_type: &'static str) {
        counter!("ledger_transactions_total", "type" => transaction_type).increment(1);
    }

    /// Record a transfer outcome (`success`, `failed`, `rejected`).
    pub fn record_transfer(outcome: &'static str) {
        counter!("transfers_total", "outcome" => outcome).increment(1);
    }
}

/// Fault injection metrics recorder.
pub struct ResiliencyMetrics;

impl ResiliencyMetrics {
    /// Record a drawn status code.
    pub fn record_fault(code: u32) {
        counter!("resiliency_faults_total", "code" => code.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_starts_without_handle() {
        let exporter = MetricsExporter::new();
        assert!(exporter.handle().is_none());
        assert!(exporter.render().is_none());
    }

    #[test]
    fn test_install_and_render() {
        let mut exporter = MetricsExporter::new();
        assert!(exporter.install().is_ok());

        RpcMetrics::record_call("GetCurrentBalance", "unary");
        LedgerMetrics::record_transaction("IN");
        LedgerMetrics::record_transfer("success");
        ResiliencyMetrics::record_fault(14);

        // handle is None when another test installed the recorder first
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("rpc_calls_total"));
            assert!(rendered.contains("ledger_transactions_total"));
            assert!(rendered.contains("resiliency_faults_total"));
        }
    }
}
