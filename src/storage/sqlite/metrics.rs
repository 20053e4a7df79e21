//! Storage operation metrics.

use std::time::Instant;

/// Records the outcome and latency of a deck storage operation.
///
/// Emits `storage_operations_total` (counter) and
/// `storage_operation_duration_ms` (histogram), both labelled with the
/// backend, operation and status.
///
/// # Examples
///
/// ```ignore
/// let start = Instant::now();
/// let result = do_work();
/// record_operation_metrics("sqlite", "apply_outcome", start, result.is_ok());
/// ```
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    success: bool,
) {
    let status = if success { "success" } else { "error" };
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
