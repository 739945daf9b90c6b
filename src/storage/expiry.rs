//! Background Expiration Reaper
//!
//! Reads already hide expired entries, so nothing a client sees depends on
//! this task. What it does is reclaim memory: an entry that expires and is
//! never touched again would otherwise stay in the map forever, and every
//! `LIST` would keep paying to skip it.
//!
//! ## Design
//!
//! The reaper runs as a Tokio task and:
//! 1. Sleeps for a fixed interval (default: 60s)
//! 2. Takes the write lock and drops every entry whose expiry has passed
//! 3. Logs how many entries were removed
//!
//! A sweep that finds nothing is a no-op. There are no retries.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// Default interval between sweeps.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Longest sweep period the ticker is given (about 30 years).
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(86400 * 365 * 30);

/// Configuration for the expiration reaper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval between sweeps (default: 60s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REAPER_INTERVAL,
        }
    }
}

/// A handle to the running reaper.
///
/// When this handle is dropped, the reaper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the reaper as a background task.
    ///
    /// Must be called from within a Tokio runtime. The returned handle stops
    /// the task when dropped.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use shrmpl_kv::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = config.interval.as_secs_f64(),
            "Expiration reaper started"
        );
        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the reaper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Expiration reaper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = sweep_ticker(config.interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiration reaper received shutdown signal");
                    return;
                }
            }
        }

        let expired = engine.cleanup_expired();
        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys reaped"
            );
        }
    }
}

/// A ticker whose first tick is one full period away.
fn sweep_ticker(interval: Duration) -> time::Interval {
    let period = interval.min(MAX_SWEEP_INTERVAL);
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Starts the reaper with the default 60 second interval.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_reaps_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            engine
                .set(&format!("key{}", i), "value", Some(Duration::from_millis(50)))
                .unwrap();
        }
        engine.set("persistent", "value", None).unwrap();
        assert_eq!(engine.len(), 11);

        let config = ExpiryConfig {
            interval: Duration::from_millis(10),
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get("persistent"), Some("value".to_string()));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        let config = ExpiryConfig {
            interval: Duration::from_millis(10),
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        engine
            .set("key", "value", Some(Duration::from_millis(10)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody reaped it, but reads still hide it
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get("key"), None);
    }

    #[tokio::test]
    async fn test_default_interval() {
        assert_eq!(ExpiryConfig::default().interval, Duration::from_secs(60));

        let engine = Arc::new(StorageEngine::new());
        engine
            .set("key", "value", Some(Duration::from_millis(1)))
            .unwrap();
        let _sweeper = start_expiry_sweeper(Arc::clone(&engine));

        // The first sweep is a full interval away
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_interval_is_clamped() {
        let ticker = sweep_ticker(Duration::from_secs(u64::MAX));
        assert_eq!(ticker.period(), MAX_SWEEP_INTERVAL);

        let ticker = sweep_ticker(Duration::from_secs(60));
        assert_eq!(ticker.period(), Duration::from_secs(60));
    }
}
