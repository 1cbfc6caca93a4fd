use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "salonbook_bookings_total";

/// Counter: move attempts. Labels: outcome.
pub const MOVES_TOTAL: &str = "salonbook_moves_total";

/// Counter: status transitions. Labels: outcome.
pub const STATUS_CHANGES_TOTAL: &str = "salonbook_status_changes_total";

/// Counter: conflicts reported to callers. Labels: kind.
pub const CONFLICTS_TOTAL: &str = "salonbook_conflicts_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "salonbook_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: failed attempts to enter a staff-day's exclusive section.
pub const LOCK_CONTENTION_TOTAL: &str = "salonbook_lock_contention_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "salonbook_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "salonbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "salonbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Count one committer call under `counter` and time it under `operation`.
pub fn record_outcome<T>(
    counter: &'static str,
    operation: &'static str,
    result: &Result<T, EngineError>,
    started: Instant,
) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    metrics::counter!(counter, "outcome" => outcome).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if let Err(EngineError::Conflict(conflicts)) = result {
        for c in conflicts {
            metrics::counter!(CONFLICTS_TOTAL, "kind" => c.kind.label()).increment(1);
        }
    }
}
