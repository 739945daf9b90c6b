//! Per-connection heartbeat timer.
//!
//! Idle TCP connections get silently dropped by NATs and load balancers. To
//! keep them alive the server writes an unsolicited `UPONG` line on every
//! connection at a fixed interval, whatever the client is doing. Clients
//! discard it; it never counts as a response.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

/// Stand-in deadline for intervals too long for the clock (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Schedules heartbeats for one connection.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    /// When the last heartbeat went out (or the connection opened)
    last_activity: Instant,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_activity: Instant::now(),
        }
    }

    /// When the next heartbeat is due.
    pub fn deadline(&self) -> Instant {
        self.last_activity
            .checked_add(self.interval)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
    }

    /// Waits until the next heartbeat is due.
    ///
    /// Cancel safe: dropping the future before it completes leaves the
    /// schedule untouched.
    pub async fn tick(&mut self) {
        sleep_until(self.deadline()).await;
        self.last_activity = Instant::now();
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_elapsed(start: Instant, secs: u64) {
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(secs), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(secs) + Duration::from_millis(10), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_fixed_interval() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(Duration::from_secs(120));

        heartbeat.tick().await;
        assert_elapsed(start, 120);

        heartbeat.tick().await;
        assert_elapsed(start, 240);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_tick_keeps_schedule() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(Duration::from_secs(10));

        let cancelled = tokio::time::timeout(Duration::from_secs(4), heartbeat.tick()).await;
        assert!(cancelled.is_err());

        heartbeat.tick().await;
        assert_elapsed(start, 10);
    }

    #[test]
    fn test_default_interval() {
        let heartbeat = Heartbeat::default();
        assert_eq!(heartbeat.interval, Duration::from_secs(120));
        assert_eq!(heartbeat.deadline(), heartbeat.last_activity + heartbeat.interval);
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let heartbeat = Heartbeat::new(Duration::from_secs(u64::MAX));
        assert!(heartbeat.deadline() > Instant::now() + Duration::from_secs(86400 * 365));
    }
}
