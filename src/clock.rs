use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Source of monotonic timestamps, in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Wall clock backed by [`Instant`], measured from construction.
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Simulated clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self { now: Arc::new(Mutex::new(start_ms)) }
    }

    pub fn advance(&self, ms: f64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += ms;
    }

    pub fn set(&self, ms: f64) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
