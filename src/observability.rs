use std::net::SocketAddr;

// ── Booking metrics ─────────────────────────────────────────────

/// Counter: reservations committed.
pub const RESERVATIONS_CREATED_TOTAL: &str = "hotel_reservations_created_total";

/// Counter: bookings rejected because the room was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "hotel_booking_conflicts_total";

/// Counter: committed lifecycle transitions. Labels: transition.
pub const LIFECYCLE_TRANSITIONS_TOTAL: &str = "hotel_lifecycle_transitions_total";

/// Counter: transitions rejected from the wrong state.
pub const STATE_ERRORS_TOTAL: &str = "hotel_state_errors_total";

/// Counter: cancellations flagged for refund.
pub const REFUNDS_REQUESTED_TOTAL: &str = "hotel_refunds_requested_total";

/// Histogram: `find_available_rooms` latency in seconds.
pub const AVAILABILITY_QUERY_DURATION_SECONDS: &str = "hotel_availability_query_duration_seconds";

// ── Resource metrics ────────────────────────────────────────────

/// Gauge: rooms known to the engine.
pub const ROOMS_REGISTERED: &str = "hotel_rooms_registered";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hotel_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hotel_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "hotel_wal_compactions_total";

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
