use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::engine::Engine;
use crate::model::now_ms;
use crate::observability;

/// Periodic driver for everything time-based: due reminders, reminder
/// backfill, and completion of elapsed lessons. All user-facing operations
/// stay off this path; a slow tick delays reminders, never bookings.
pub async fn run_scheduler(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(engine.config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let started = std::time::Instant::now();
        let now = now_ms();

        let fired = engine.tick(now).await;
        let backfilled = engine.backfill_reminders(now).await;
        let completed = engine.sweep_completed(now).await;

        metrics::histogram!(observability::TICK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if fired > 0 || backfilled > 0 || completed > 0 {
            info!("tick: {fired} reminders sent, {backfilled} backfilled, {completed} lessons completed");
        }
    }
}

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Compact the WAL once enough appends have accumulated since the last
/// compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends <= threshold {
            continue;
        }
        info!("compacting WAL after {appends} appends");
        if let Err(e) = engine.compact_wal().await {
            error!("WAL compaction failed: {e}");
        }
    }
}
