use std::net::SocketAddr;

use crate::engine::BookingError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking admissions. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "staylock_admissions_total";

/// Histogram: admission latency in seconds, including lock wait.
pub const ADMISSION_DURATION_SECONDS: &str = "staylock_admission_duration_seconds";

/// Counter: applied status transitions. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "staylock_transitions_total";

/// Counter: HTTP requests. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "staylock_http_requests_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: listing calendars loaded in memory.
pub const CALENDARS_ACTIVE: &str = "staylock_calendars_active";

/// Counter: pending reservations cancelled by the sweeper after their TTL.
pub const PENDING_EXPIRED_TOTAL: &str = "staylock_pending_expired_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "staylock_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "staylock_wal_flush_batch_size";

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

/// Short label for an admission or transition failure.
pub fn error_label(err: &BookingError) -> &'static str {
    match err {
        BookingError::ListingNotFound(_) => "listing_not_found",
        BookingError::ListingInactive(_) => "listing_inactive",
        BookingError::PolicyViolation(_) => "policy_violation",
        BookingError::DateConflict { .. } => "date_conflict",
        BookingError::AdmissionTimeout(_) => "admission_timeout",
        BookingError::ReservationNotFound(_) => "reservation_not_found",
        BookingError::InvalidTransition { .. } => "invalid_transition",
        BookingError::StaleState(_) => "stale_state",
        BookingError::AlreadyExists(_) => "already_exists",
        BookingError::LimitExceeded(_) => "limit_exceeded",
        BookingError::WalError(_) => "wal_error",
    }
}
