use std::net::SocketAddr;

use crate::engine::{EngineError, Rejection};

// ── Request-driven ──────────────────────────────────────────────

/// Counter: candidate checks. Labels: outcome.
pub const CHECKS_TOTAL: &str = "courtbook_checks_total";

/// Counter: reservations committed.
pub const BOOKINGS_TOTAL: &str = "courtbook_bookings_total";

/// Counter: booking attempts that did not commit. Labels: outcome.
pub const BOOKING_FAILURES_TOTAL: &str = "courtbook_booking_failures_total";

/// Counter: cancel requests. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "courtbook_cancellations_total";

/// Counter: store calls that exceeded the configured timeout.
pub const STORE_TIMEOUTS_TOTAL: &str = "courtbook_store_timeouts_total";

/// Histogram: wall time of one `enumerate_slots` call, in seconds.
pub const ENUMERATE_DURATION_SECONDS: &str = "courtbook_enumerate_duration_seconds";

// ── Resources ───────────────────────────────────────────────────

/// Gauge: tenants with a loaded engine.
pub const TENANTS_ACTIVE: &str = "courtbook_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtbook_wal_flush_duration_seconds";

/// Histogram: events per WAL group commit.
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtbook_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op when `port` is `None`.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metric label for a check outcome.
pub fn rejection_label(rejection: Option<&Rejection>) -> &'static str {
    match rejection {
        None => "bookable",
        Some(Rejection::OutOfSchedule) => "out_of_schedule",
        Some(Rejection::Occupied { .. }) => "occupied",
        Some(Rejection::WouldCreateHole { .. }) => "would_create_hole",
        Some(Rejection::UnknownCourt { .. }) => "unknown_court",
        Some(Rejection::UnsupportedAddon { .. }) => "unsupported_addon",
        Some(Rejection::InvalidDuration(_)) => "invalid_duration",
    }
}

/// Label for failures that are not rejections.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::Rejected(r) => rejection_label(Some(r)),
        EngineError::NotFound(_) => "not_found",
        EngineError::Unsupported(_) => "unsupported",
        EngineError::Unpriced { .. } => "unpriced",
        EngineError::InvalidStatus(_) => "invalid_status",
        EngineError::Retryable(_) => "retryable",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::InvalidConfig(_) => "invalid_config",
        EngineError::WalError(_) => "wal_error",
    }
}
