//! Background space reclamation for the cache store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info};

use crate::store::CacheStore;

pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Spawns the reclamation loop.
///
/// The first pass runs one `every` after start. Failures are logged and the
/// loop keeps going; only `shutdown` ends it. Every pass is idempotent, so
/// abandoning one halfway is harmless.
pub fn spawn_reclaimer(
    store: Arc<CacheStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let every = if every.is_zero() {
        DEFAULT_RECLAIM_INTERVAL
    } else {
        every
    };

    info!(
        target: "tsproxy::reclaim",
        interval_secs = every.as_secs(),
        "Cache reclamation task started"
    );

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(target: "tsproxy::reclaim", "Cache reclamation task stopped");
                    break;
                }
                _ = ticker.tick() => run_once(&store).await,
            }
        }
    })
}

async fn run_once(store: &CacheStore) {
    // a full stats scan reads every record, so it only runs at debug
    if tracing::enabled!(target: "tsproxy::reclaim", Level::DEBUG) {
        match store.stats().await {
            Ok(stats) => debug!(target: "tsproxy::reclaim", ?stats, "Cache stats before reclamation"),
            Err(e) => error!(target: "tsproxy::reclaim", error = %e, "Failed to read cache stats"),
        }
    }
    let before = match store.disk_bytes().await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(target: "tsproxy::reclaim", error = %e, "Failed to read cache size");
            None
        }
    };

    match store.reclaim().await {
        Ok(report) if report.is_empty() => {
            debug!(
                target: "tsproxy::reclaim",
                scanned = report.scanned,
                disk_bytes = before,
                "Nothing to reclaim"
            );
        }
        Ok(report) => {
            let after = store.disk_bytes().await.ok();
            info!(
                target: "tsproxy::reclaim",
                scanned = report.scanned,
                removed = report.removed,
                reclaimed_bytes = report.reclaimed_bytes,
                disk_bytes_before = before,
                disk_bytes_after = after,
                "Cache reclamation finished"
            );
        }
        Err(e) => {
            error!(target: "tsproxy::reclaim", error = %e, "Cache reclamation failed");
        }
    }
}
