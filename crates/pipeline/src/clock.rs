//! Time source for poll loops.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use storyreel_core::types::Timestamp;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose sleeps return immediately and advance virtual time.
#[derive(Debug)]
pub struct ManualClock {
    start: Timestamp,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Utc::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(0),
        }
    }

    /// Total virtual time slept.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of `sleep` calls made.
    pub fn sleep_count(&self) -> u32 {
        *self.sleeps.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.elapsed();
        self.start + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner()) += duration;
        *self.sleeps.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_advances_without_waiting() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_secs(600)).await;
        clock.sleep(Duration::from_secs(600)).await;
        assert_eq!(clock.elapsed(), Duration::from_secs(1200));
        assert_eq!(clock.sleep_count(), 2);
        assert_eq!((clock.now() - before).num_seconds(), 1200);
    }
}
