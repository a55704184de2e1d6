use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a positive, finite number of milliseconds (got {value})")]
    NonPositive { field: &'static str, value: f64 },
    #[error("calibration_backoff_factor must be >= 1.0 (got {0})")]
    Backoff(f64),
    #[error("calibration_max_delay_ms ({max}) must not be below calibration_initial_delay_ms ({initial})")]
    MaxBelowInitial { initial: f64, max: f64 },
}

/// Tunables for one meter. Every field is optional when deserialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Wall-clock span the smoothing window should cover.
    pub target_window_ms: f64,
    /// Seeding ends once this much time has elapsed since the first sample.
    pub seed_duration_ms: f64,
    /// Cadence at which reporters read the estimate.
    pub report_interval_ms: f64,
    pub calibration_initial_delay_ms: f64,
    pub calibration_backoff_factor: f64,
    pub calibration_max_delay_ms: f64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            target_window_ms: 3000.0,
            seed_duration_ms: 400.0,
            report_interval_ms: 1000.0,
            calibration_initial_delay_ms: 1000.0,
            calibration_backoff_factor: 1.2,
            calibration_max_delay_ms: 30_000.0,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

impl MeterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("target_window_ms", self.target_window_ms)?;
        positive("seed_duration_ms", self.seed_duration_ms)?;
        positive("report_interval_ms", self.report_interval_ms)?;
        positive("calibration_initial_delay_ms", self.calibration_initial_delay_ms)?;
        positive("calibration_max_delay_ms", self.calibration_max_delay_ms)?;
        if !self.calibration_backoff_factor.is_finite() || self.calibration_backoff_factor < 1.0 {
            return Err(ConfigError::Backoff(self.calibration_backoff_factor));
        }
        if self.calibration_max_delay_ms < self.calibration_initial_delay_ms {
            return Err(ConfigError::MaxBelowInitial {
                initial: self.calibration_initial_delay_ms,
                max: self.calibration_max_delay_ms,
            });
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs_f64(self.report_interval_ms / 1000.0)
    }
}
