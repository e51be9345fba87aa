//! Prometheus metrics for the message lifecycle.
//!
//! [`MessageService`](crate::MessageService) emits the counters below through
//! the `metrics` facade. They go nowhere until a recorder is installed, which
//! [`install_prometheus`] does once per process.
//!
//! # Example
//!
//! ```rust,no_run
//! use msgflow_runtime::metrics::install_prometheus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_prometheus()?;
//! // Serve `handle.render()` at /metrics
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Messages stored and announced with a start event.
pub const MESSAGES_CREATED: &str = "msgflow_messages_created_total";
/// Messages stored whose start event could not be published.
pub const MESSAGES_PUBLISH_FAILED: &str = "msgflow_messages_publish_failed_total";
/// Completions applied to a stored message.
pub const MESSAGES_PROCESSED: &str = "msgflow_messages_processed_total";
/// Completions that could not be applied.
pub const MESSAGES_UPDATE_FAILED: &str = "msgflow_messages_update_failed_total";

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The Prometheus recorder could not be installed
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register descriptions for every lifecycle counter with the installed
/// recorder.
pub fn describe() {
    describe_counter!(
        MESSAGES_CREATED,
        "Total number of messages stored and sent for processing"
    );
    describe_counter!(
        MESSAGES_PUBLISH_FAILED,
        "Total number of stored messages whose start event was not published"
    );
    describe_counter!(
        MESSAGES_PROCESSED,
        "Total number of completions recorded"
    );
    describe_counter!(
        MESSAGES_UPDATE_FAILED,
        "Total number of completions that could not be recorded"
    );
}

/// Install the Prometheus recorder as the global recorder.
///
/// The returned handle renders the current values in the text exposition
/// format.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a global recorder is already
/// installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    describe();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}
