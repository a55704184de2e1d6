use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{ConfigError, MeterConfig};
use crate::ewma::{samples_for_window, IntervalAverager, MIN_INTERVAL_MS};
use crate::seed::Seeder;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Seeding,
    SteadyState,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Seeding => "seeding",
            Phase::SteadyState => "steady",
        };
        f.write_str(s)
    }
}

/// Result of a read: either a smoothed interval or an explicit sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Estimate {
    Unavailable,
    Interval { interval_ms: f64 },
}

impl Estimate {
    pub fn interval_ms(&self) -> Option<f64> {
        match self {
            Estimate::Unavailable => None,
            Estimate::Interval { interval_ms } => Some(*interval_ms),
        }
    }

    /// Events per second.
    pub fn rate_hz(&self) -> Option<f64> {
        self.interval_ms().map(|ms| 1000.0 / ms)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Estimate::Interval { .. })
    }
}

/// What a sample did to the state machine.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Transition {
    None,
    Started,
    /// Seeding finished; the calibration schedule should be armed.
    Steady { initial_ms: f64, decay_samples: u32 },
    /// The estimator has been disposed and ignored the input.
    Frozen,
}

#[derive(Clone, Debug)]
enum State {
    Uninitialized,
    Seeding(Seeder),
    Steady(IntervalAverager),
}

/// Serializable view of one estimator, handed to reporters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub phase: Phase,
    pub estimate: Estimate,
    pub rate_hz: Option<f64>,
    pub decay_samples: Option<u32>,
    pub samples: u64,
    pub calibrations: u64,
}

/// Seeded, self-calibrating EWMA of the interval between events.
///
/// All mutation goes through `&mut self`; see `Meter` and `SharedMeter` for
/// the single-threaded and locked front ends.
#[derive(Clone, Debug)]
pub struct RateEstimator {
    config: MeterConfig,
    state: State,
    prev_ms: f64,
    samples: u64,
    calibrations: u64,
    disposed: bool,
}

impl RateEstimator {
    pub fn new(config: MeterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: State::Uninitialized,
            prev_ms: 0.0,
            samples: 0,
            calibrations: 0,
            disposed: false,
        })
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Feed one event occurrence stamped at `ts_ms`.
    pub fn record(&mut self, ts_ms: f64) -> Transition {
        if self.disposed {
            return Transition::Frozen;
        }
        self.samples = self.samples.saturating_add(1);
        let prev = std::mem::replace(&mut self.prev_ms, ts_ms);
        match &mut self.state {
            State::Uninitialized => {
                self.state = State::Seeding(Seeder::start(ts_ms));
                debug!(ts_ms, "seeding started");
                Transition::Started
            }
            State::Seeding(seeder) => match seeder.observe(ts_ms, self.config.seed_duration_ms) {
                Some(initial_ms) => {
                    let decay_samples = samples_for_window(self.config.target_window_ms, initial_ms);
                    debug!(initial_ms, decay_samples, events = seeder.events(), "seeding complete");
                    self.state = State::Steady(IntervalAverager::new(decay_samples, initial_ms));
                    Transition::Steady { initial_ms, decay_samples }
                }
                None => Transition::None,
            },
            State::Steady(avg) => {
                let m = ts_ms - prev;
                if m.is_nan() || m <= 0.0 {
                    trace!(interval_ms = m, "non-positive interval clamped to {MIN_INTERVAL_MS}");
                }
                avg.update(m);
                Transition::None
            }
        }
    }

    /// Re-derive `N` so it spans the target window at the current interval.
    /// Returns the new sample count, or `None` outside steady state.
    pub fn recalibrate(&mut self) -> Option<u32> {
        if self.disposed {
            return None;
        }
        let State::Steady(avg) = &mut self.state else {
            return None;
        };
        let current = avg.value();
        if current.is_nan() || current <= 0.0 {
            return None;
        }
        let old = avg.size();
        let n = samples_for_window(self.config.target_window_ms, current);
        avg.resize(n);
        self.calibrations = self.calibrations.saturating_add(1);
        if n != old {
            debug!(old, new = n, estimate_ms = current, "recalibrated decay window");
        }
        Some(n)
    }

    pub fn estimate(&self) -> Estimate {
        match &self.state {
            State::Steady(avg) => Estimate::Interval { interval_ms: avg.value() },
            _ => Estimate::Unavailable,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Uninitialized => Phase::Uninitialized,
            State::Seeding(_) => Phase::Seeding,
            State::Steady(_) => Phase::SteadyState,
        }
    }

    pub fn decay_samples(&self) -> Option<u32> {
        match &self.state {
            State::Steady(avg) => Some(avg.size()),
            _ => None,
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn calibrations(&self) -> u64 {
        self.calibrations
    }

    /// Freeze the state; later samples and calibrations are ignored.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self, name: &str) -> Snapshot {
        let estimate = self.estimate();
        Snapshot {
            name: name.to_string(),
            phase: self.phase(),
            estimate,
            rate_hz: estimate.rate_hz(),
            decay_samples: self.decay_samples(),
            samples: self.samples,
            calibrations: self.calibrations,
        }
    }
}
