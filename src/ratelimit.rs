//! Per-caller scan admission control.
//!
//! A fixed-duration window with a fixed attempt quota, keyed by caller
//! identity. The check-and-increment happens under the map entry's shard
//! lock, so concurrent requests for the same caller cannot lose updates or
//! double-count. Windows reset implicitly once their duration elapses;
//! there is no explicit teardown.
//!
//! Rejection is the sole admission-control mechanism: it happens before any
//! browser process is allocated, so shedding load costs nearly nothing.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

/// Sliding fixed-window rate limiter, shared process-wide.
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            windows: DashMap::new(),
        }
    }

    /// Try to admit one attempt for `caller`.
    pub fn try_acquire(&self, caller: &str) -> Decision {
        self.try_acquire_at(caller, Instant::now())
    }

    /// Clock-explicit variant of [`try_acquire`](Self::try_acquire); tests
    /// drive this with pinned instants.
    pub fn try_acquire_at(&self, caller: &str, now: Instant) -> Decision {
        let mut entry = self
            .windows
            .entry(caller.to_string())
            .or_insert_with(|| Window {
                start: now,
                count: 0,
            });
        let window = entry.value_mut();

        if now.duration_since(window.start) >= self.window {
            window.start = now;
            window.count = 0;
        }

        if window.count >= self.max_attempts {
            let retry_after = self.window.saturating_sub(now.duration_since(window.start));
            return Decision::Limited { retry_after };
        }

        window.count += 1;
        Decision::Allowed
    }

    /// Drop windows whose reset time has already passed. Purely
    /// housekeeping; correctness never depends on this being called.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.start) < self.window);
    }

    /// Number of callers currently tracked.
    pub fn tracked_callers(&self) -> usize {
        self.windows.len()
    }
}
