use serde::Serialize;

use crate::clock::ManualClock;
use crate::config::MeterConfig;
use crate::estimator::Snapshot;
use crate::meter::Meter;
use crate::MeterError;

/// A synthetic event stream: constant interval, optionally switching to a
/// second interval after `step_after` samples.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub interval_ms: f64,
    pub samples: usize,
    pub step_interval_ms: Option<f64>,
    pub step_after: usize,
}

/// Upper bound on reports a single simulation may produce.
pub const MAX_REPORTS: f64 = 1_000_000.0;

impl Scenario {
    /// Reject intervals that are not positive and finite, and streams whose
    /// simulated duration would produce more than [`MAX_REPORTS`] reads.
    pub fn validate(&self, report_interval_ms: f64) -> Result<(), MeterError> {
        let check = |field: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(MeterError::Scenario(format!("{field} must be a positive, finite number of milliseconds (got {v})")))
            }
        };
        check("interval_ms", self.interval_ms)?;
        if let Some(step) = self.step_interval_ms {
            check("step_interval_ms", step)?;
        }
        let before = self.step_after.min(self.samples) as f64;
        let after = self.samples as f64 - before;
        let duration_ms = match self.step_interval_ms {
            Some(step) => before * self.interval_ms + after * step,
            None => self.samples as f64 * self.interval_ms,
        };
        let reports = duration_ms / report_interval_ms;
        if reports.is_nan() || reports > MAX_REPORTS {
            return Err(MeterError::Scenario(format!(
                "{duration_ms} ms of simulated time at one report every {report_interval_ms} ms exceeds {MAX_REPORTS} reports"
            )));
        }
        Ok(())
    }

    fn interval_at(&self, index: usize) -> f64 {
        match self.step_interval_ms {
            Some(step) if index >= self.step_after => step,
            _ => self.interval_ms,
        }
    }
}

/// One reporter read during a simulation.
#[derive(Clone, Debug, Serialize)]
pub struct SimReport {
    pub at_ms: f64,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

/// Drive a [`Meter`] over simulated time, reading it every
/// `report_interval_ms` the way a reporter would.
pub fn simulate(name: &str, scenario: &Scenario, config: MeterConfig) -> Result<Vec<SimReport>, MeterError> {
    let report_every = config.report_interval_ms;
    config.validate()?;
    scenario.validate(report_every)?;
    let clock = ManualClock::new(0.0);
    let mut meter = Meter::new(name, config, clock.clone())?;
    let mut reports = Vec::new();
    let mut now = 0.0;
    let mut next_report = report_every;

    meter.sample();
    for i in 0..scenario.samples {
        let ts = now + scenario.interval_at(i);
        // reads that fall between two samples see the state before the later one
        while next_report <= ts {
            clock.set(next_report);
            meter.poll();
            reports.push(SimReport { at_ms: next_report, snapshot: meter.snapshot() });
            next_report += report_every;
        }
        now = ts;
        clock.set(now);
        meter.sample();
    }
    meter.dispose();
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{Estimate, Phase};

    #[test]
    fn steady_60hz_reports_60() {
        let scenario = Scenario { interval_ms: 16.667, samples: 1200, step_interval_ms: None, step_after: 0 };
        let reports = simulate("frames", &scenario, MeterConfig::default()).unwrap();
        // 1200 * 16.667 ms is just over 20 s
        assert_eq!(reports.len(), 20);
        // first read at 1000 ms is already past seeding
        assert_eq!(reports[0].snapshot.phase, Phase::SteadyState);
        let last = &reports.last().unwrap().snapshot;
        assert_eq!(last.rate_hz.unwrap().round(), 60.0);
        assert_eq!(last.decay_samples, Some(180));
    }

    #[test]
    fn slow_stream_stays_unavailable() {
        let cfg = MeterConfig { seed_duration_ms: 10_000.0, ..Default::default() };
        let scenario = Scenario { interval_ms: 100.0, samples: 50, step_interval_ms: None, step_after: 0 };
        let reports = simulate("frames", &scenario, cfg).unwrap();
        assert!(!reports.is_empty());
        assert!(reports.iter().all(|r| r.snapshot.estimate == Estimate::Unavailable));
    }

    #[test]
    fn step_change_reaches_new_rate() {
        let scenario = Scenario { interval_ms: 16.667, samples: 2000, step_interval_ms: Some(100.0), step_after: 600 };
        let reports = simulate("frames", &scenario, MeterConfig::default()).unwrap();
        let last = &reports.last().unwrap().snapshot;
        let ms = last.estimate.interval_ms().unwrap();
        assert!((ms - 100.0).abs() < 1.0);
        // calibration shortened the window in samples to keep ~3 s
        assert!(last.decay_samples.unwrap() <= 31);

        let rates: Vec<f64> = reports.iter().filter_map(|r| r.snapshot.estimate.interval_ms()).collect();
        assert!(rates.windows(2).all(|w| w[1] >= w[0] - 1e-6));
    }

    #[test]
    fn rejects_unusable_intervals() {
        for bad in [0.0, -16.0, f64::INFINITY, f64::NAN] {
            let scenario = Scenario { interval_ms: bad, samples: 1, step_interval_ms: None, step_after: 0 };
            let err = simulate("frames", &scenario, MeterConfig::default()).unwrap_err();
            assert!(matches!(err, MeterError::Scenario(_)), "{bad} accepted");
        }
        let scenario = Scenario { interval_ms: 16.0, samples: 10, step_interval_ms: Some(f64::INFINITY), step_after: 5 };
        let err = simulate("frames", &scenario, MeterConfig::default()).unwrap_err();
        assert!(err.to_string().contains("step_interval_ms"));
    }

    #[test]
    fn rejects_runaway_report_count() {
        let cfg = MeterConfig { report_interval_ms: 1.0, ..Default::default() };
        let scenario = Scenario { interval_ms: 2_000_000.0, samples: 1, step_interval_ms: None, step_after: 0 };
        let err = simulate("frames", &scenario, cfg).unwrap_err();
        assert!(err.to_string().contains("reports"));

        // the same stream read once a second is fine
        let reports = simulate("frames", &scenario, MeterConfig::default()).unwrap();
        assert_eq!(reports.len(), 2000);
    }

    #[test]
    fn reports_serialize_flat() {
        let scenario = Scenario { interval_ms: 50.0, samples: 40, step_interval_ms: None, step_after: 0 };
        let reports = simulate("frames", &scenario, MeterConfig::default()).unwrap();
        let json = serde_json::to_value(&reports[0]).unwrap();
        assert_eq!(json["at_ms"], 1000.0);
        assert_eq!(json["name"], "frames");
        assert_eq!(json["phase"], "steady_state");
    }
}
