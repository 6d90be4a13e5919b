//! Metrics for observability.
//!
//! Emits through the [`metrics`] facade; installing a recorder/exporter is
//! left to the host process. Without one, every call here is a no-op.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replicator_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record rows pulled from the source cursor.
pub fn record_rows_extracted(count: usize) {
    counter!("replicator_rows_extracted_total").increment(count as u64);
}

/// Record a batch accepted by the destination.
pub fn record_batch_loaded(documents: usize, duration: Duration) {
    counter!("replicator_batches_loaded_total").increment(1);
    counter!("replicator_documents_loaded_total").increment(documents as u64);
    histogram!("replicator_batch_load_duration_seconds").record(duration.as_secs_f64());
}

/// Record a retry scheduled by the backoff policy.
pub fn record_retry(operation: &str, delay: Duration) {
    counter!("replicator_retries_total", "operation" => operation.to_string()).increment(1);
    histogram!("replicator_retry_delay_seconds", "operation" => operation.to_string())
        .record(delay.as_secs_f64());
}

/// Record a failure that outlived the backoff budget.
pub fn record_retry_exhausted(operation: &str) {
    counter!("replicator_retry_exhausted_total", "operation" => operation.to_string()).increment(1);
}

/// Record the watermark after a successful advance (unix seconds).
pub fn record_watermark(unix_seconds: i64) {
    gauge!("replicator_watermark_seconds").set(unix_seconds as f64);
}

/// Record a state file write.
pub fn record_state_persist(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replicator_state_persists_total", "status" => status).increment(1);
}

/// Record one drain of the source backlog.
pub fn record_drain_cycle(batches: usize, duration: Duration) {
    counter!("replicator_drain_cycles_total").increment(1);
    histogram!("replicator_drain_batches").record(batches as f64);
    histogram!("replicator_drain_duration_seconds").record(duration.as_secs_f64());
}
