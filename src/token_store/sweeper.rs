/// Periodic expiry sweep
///
/// Runs `sweep_expired` on its own task, off the request path. A failed
/// sweep is logged and the loop carries on with the next tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::RefreshTokenStore;

/// Sweeps slower than this are worth a warning
const SLOW_SWEEP: Duration = Duration::from_secs(10);

/// Spawn the sweep loop
///
/// The first sweep happens after `initial_delay`, then every `interval`.
pub fn spawn_sweeper(
    store: Arc<dyn RefreshTokenStore>,
    interval: Duration,
    initial_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + initial_delay;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            sweep_once(store.as_ref()).await;
        }
    })
}

async fn sweep_once(store: &dyn RefreshTokenStore) {
    let started = Instant::now();
    match store.sweep_expired().await {
        Ok(deleted) => {
            let elapsed = started.elapsed();
            let elapsed_ms = elapsed.as_millis() as u64;
            if elapsed > SLOW_SWEEP {
                tracing::warn!(deleted, elapsed_ms, "Expired refresh token sweep was slow");
            } else if deleted > 0 {
                tracing::info!(deleted, elapsed_ms, "Swept expired refresh tokens");
            } else {
                tracing::debug!(elapsed_ms, "No expired refresh tokens to sweep");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Expired refresh token sweep failed");
        }
    }
}
