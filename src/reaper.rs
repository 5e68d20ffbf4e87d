use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Background task that advances reservations with the calendar date and
/// expires stale pending holds.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let now = Utc::now();
        let report = engine.sweep(now.date_naive(), now).await;
        if report.activated + report.completed + report.expired > 0 {
            info!(
                activated = report.activated,
                completed = report.completed,
                expired = report.expired,
                "lifecycle sweep"
            );
        } else {
            debug!("lifecycle sweep: nothing due");
        }
    }
}

/// Background task that compacts the reservation log once enough appends
/// have accumulated.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// Returns true when a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact().await {
        Ok(()) => {
            info!(appends, "compacted reservation log");
            true
        }
        Err(e) => {
            warn!("compaction failed: {e}");
            false
        }
    }
}
