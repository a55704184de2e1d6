//! Live, self-calibrating rate meter for recurring events.
//!
//! A meter seeds an average interval from the first few hundred milliseconds
//! of samples, then tracks it with an exponentially weighted average whose
//! sample window is periodically re-derived so it keeps spanning the same
//! wall-clock duration as the event rate drifts.

pub mod calibrator;
pub mod clock;
pub mod config;
pub mod estimator;
pub mod ewma;
pub mod meter;
pub mod registry;
pub mod reporter;
pub mod seed;
pub mod shared;
pub mod sim;

use thiserror::Error;

pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::config::{ConfigError, MeterConfig};
pub use crate::estimator::{Estimate, Phase, RateEstimator, Snapshot};
pub use crate::meter::Meter;
pub use crate::registry::MeterRegistry;
pub use crate::shared::SharedMeter;

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("invalid meter configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn calibration thread")]
    Spawn(#[source] std::io::Error),
    #[error("invalid simulation: {0}")]
    Scenario(String),
}
