//! Periodic purge of expired statistics
//!
//! Reads already ignore expired entries; the sweeper only bounds how long
//! they occupy the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use tally_core::CacheSettings;

use crate::cache::StatisticsCache;

/// Shortest interval a sweeper ticks at
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running sweeper task
///
/// Dropping the handle also stops the task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Whether the task is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Cache sweeper exited abnormally: {}", e);
        }
    }
}

/// Spawn a task that runs `clear_expired_cache` every `interval`
///
/// The first sweep happens one interval after spawning. Failed sweeps are
/// logged and retried on the next tick. Intervals below
/// [`MIN_SWEEP_INTERVAL`] are raised to it.
pub fn spawn_sweeper(cache: Arc<StatisticsCache>, interval: Duration) -> SweeperHandle {
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    let (tx, mut rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!("Cache sweeper started, interval {:?}", interval);
        loop {
            tokio::select! {
                _ = &mut rx => break,
                _ = ticker.tick() => match cache.clear_expired_cache().await {
                    Ok(0) => debug!("Cache sweep found nothing to purge"),
                    Ok(removed) => debug!("Cache sweep purged {} entries", removed),
                    Err(e) => warn!("Cache sweep failed: {}", e),
                },
            }
        }
        info!("Cache sweeper stopped");
    });

    SweeperHandle {
        shutdown: Some(tx),
        task,
    }
}

/// Spawn a sweeper on the interval from configuration
pub fn spawn_sweeper_with_settings(
    cache: Arc<StatisticsCache>,
    settings: &CacheSettings,
) -> SweeperHandle {
    spawn_sweeper(cache, settings.sweep_interval())
}
