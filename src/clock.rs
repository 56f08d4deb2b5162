//! Time sources.
//!
//! # Responsibilities
//! - Provide "now" to the rate limiter and CSRF token cache
//! - Allow tests to drive time without waiting on the wall clock
//!
//! # Design Decisions
//! - `TokioClock` reads `tokio::time::Instant`, so `tokio::time::pause()`
//!   and `start_paused` tests move it together with `sleep`/`interval`
//! - `ManualClock` only moves when told to

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A source of monotonic time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// Clock backed by the Tokio time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Clock that only advances when [`ManualClock::advance`] is called.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The clock used when none is injected.
pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(TokioClock)
}
