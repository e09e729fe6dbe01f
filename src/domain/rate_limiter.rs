//! Upstream call pacing.
//!
//! One limiter is shared by a whole run so the budget is global rather than
//! per instrument. The clock is injectable so tests never sleep.

use std::time::{Duration, Instant};
use tracing::trace;

/// Default spacing between upstream calls: 20 calls per second.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(50);

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Strategy for pacing upstream calls.
pub trait RateLimiter {
    /// Block until the next upstream call is allowed.
    fn wait(&mut self);
}

/// Enforces a fixed minimum interval between consecutive `wait()` returns.
pub struct FixedIntervalLimiter<C: Clock = SystemClock> {
    clock: C,
    min_interval: Duration,
    last: Option<Instant>,
}

impl FixedIntervalLimiter<SystemClock> {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, SystemClock)
    }
}

impl<C: Clock> FixedIntervalLimiter<C> {
    pub fn with_clock(min_interval: Duration, clock: C) -> Self {
        Self {
            clock,
            min_interval,
            last: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl<C: Clock> RateLimiter for FixedIntervalLimiter<C> {
    fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = self.clock.now().saturating_duration_since(last);
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                trace!(wait_ms = remaining.as_millis() as u64, "rate limiter sleeping");
                self.clock.sleep(remaining);
            }
        }
        self.last = Some(self.clock.now());
    }
}
