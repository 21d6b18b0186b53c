use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome (`booked`, `unavailable`).
pub const BOOKINGS_TOTAL: &str = "tablebook_bookings_total";

/// Histogram: time spent in the allocation policy, in seconds.
pub const ALLOCATION_DURATION_SECONDS: &str = "tablebook_allocation_duration_seconds";

/// Counter: lifecycle events raised. Labels: event.
pub const TRANSITIONS_TOTAL: &str = "tablebook_transitions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of loaded tenants.
pub const TENANTS_ACTIVE: &str = "tablebook_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
