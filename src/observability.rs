use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: allocation decisions. Labels: outcome (allocated | no_capacity).
pub const ALLOCATIONS_TOTAL: &str = "fleetd_allocations_total";

/// Histogram: time spent deciding one allocation, in seconds.
pub const ALLOCATION_DURATION_SECONDS: &str = "fleetd_allocation_duration_seconds";

/// Counter: booking lifecycle transitions. Labels: status.
pub const BOOKINGS_TOTAL: &str = "fleetd_bookings_total";

/// Counter: month availability scans served.
pub const MONTH_SCANS_TOTAL: &str = "fleetd_month_scans_total";

/// Counter: public requests turned away. Labels: reason (rate_limited | honeypot).
pub const PUBLIC_REJECTED_TOTAL: &str = "fleetd_public_rejected_total";

/// Counter: operator requests with a missing or wrong token.
pub const AUTH_FAILURES_TOTAL: &str = "fleetd_auth_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: vehicles currently in the fleet registry.
pub const FLEET_VEHICLES: &str = "fleetd_fleet_vehicles";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
