use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_TOTAL: &str = "chime_bookings_total";

/// Counter: booking attempts rejected (full slot, duplicate, closed slot).
pub const BOOKING_CONFLICTS_TOTAL: &str = "chime_booking_conflicts_total";

/// Counter: bookings cancelled. Labels: actor.
pub const CANCELLATIONS_TOTAL: &str = "chime_cancellations_total";

/// Counter: slots delayed or cancelled by an admin.
pub const SLOT_MUTATIONS_TOTAL: &str = "chime_slot_mutations_total";

// ── Scheduler metrics ───────────────────────────────────────────

/// Counter: reminders dispatched (marked sent).
pub const REMINDERS_SENT_TOTAL: &str = "chime_reminders_sent_total";

/// Counter: notification deliveries that failed (logged, not retried).
pub const DELIVERY_FAILURES_TOTAL: &str = "chime_delivery_failures_total";

/// Histogram: one scheduler tick, seconds.
pub const TICK_DURATION_SECONDS: &str = "chime_tick_duration_seconds";

// ── WAL metrics ─────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "chime_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "chime_wal_flush_batch_size";

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
