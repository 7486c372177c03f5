//! Run-wide request pacing for the inference service.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Spaces requests evenly at a fixed requests-per-minute budget.
///
/// Each caller atomically reserves the next free slot and sleeps until it.
/// Requests are delayed, never dropped.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing `rpm` requests per minute. Zero disables limiting.
    pub fn per_minute(rpm: u32) -> Self {
        let interval = if rpm == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / rpm
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::per_minute(0)
    }

    /// Minimum spacing between two requests.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for this caller's slot.
    pub async fn acquire(&self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "waiting for rate limit slot");
            tokio::time::sleep(wait).await;
        }
    }

    /// Reserve the earliest free slot at or after `now`; returns the wait.
    fn reserve(&self, now: Instant) -> Duration {
        if self.interval.is_zero() {
            return Duration::ZERO;
        }
        let mut next = self.next_slot.lock().unwrap_or_else(|p| p.into_inner());
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot - now
    }
}
