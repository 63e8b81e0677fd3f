//! Shared metrics recording for store operations.

use std::time::Instant;

/// Records two metrics for a store operation: a counter
/// (`storage_operations_total`) and a duration histogram
/// (`storage_operation_duration_ms`), both labeled by operation and status.
pub fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "storage_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
