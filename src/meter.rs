use tracing::debug;

use crate::calibrator::CalibrationSchedule;
use crate::clock::Clock;
use crate::config::{ConfigError, MeterConfig};
use crate::estimator::{Estimate, RateEstimator, Snapshot, Transition};

/// Single-threaded meter: samples, calibration ticks and reads all run on
/// the caller's thread, in timestamp order, with no locking.
pub struct Meter<C: Clock> {
    name: String,
    clock: C,
    estimator: RateEstimator,
    schedule: Option<CalibrationSchedule>,
}

impl<C: Clock> Meter<C> {
    pub fn new(name: impl Into<String>, config: MeterConfig, clock: C) -> Result<Self, ConfigError> {
        let schedule = CalibrationSchedule::new(&config);
        Ok(Self {
            name: name.into(),
            clock,
            estimator: RateEstimator::new(config)?,
            schedule: Some(schedule),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one occurrence of the measured event at the clock's current time.
    pub fn sample(&mut self) {
        let now = self.clock.now_ms();
        self.fire_due(now);
        if let Transition::Steady { .. } = self.estimator.record(now) {
            if let Some(schedule) = self.schedule.as_mut() {
                schedule.arm(now);
            }
        }
    }

    /// Run any calibration ticks that have come due. Reporters call this
    /// before reading when samples may have stopped arriving.
    pub fn poll(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.fire_due(now)
    }

    fn fire_due(&mut self, now_ms: f64) -> usize {
        let Some(schedule) = self.schedule.as_mut() else {
            return 0;
        };
        let mut fired = 0;
        while let Some(due) = schedule.take_due(now_ms) {
            if let Some(n) = self.estimator.recalibrate() {
                debug!(meter = %self.name, due_ms = due, decay_samples = n, "calibration tick");
            }
            fired += 1;
        }
        fired
    }

    pub fn read(&self) -> Estimate {
        self.estimator.estimate()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.estimator.snapshot(&self.name)
    }

    pub fn estimator(&self) -> &RateEstimator {
        &self.estimator
    }

    /// Next calibration due time, if the schedule is armed.
    pub fn next_calibration_ms(&self) -> Option<f64> {
        self.schedule.as_ref().and_then(CalibrationSchedule::next_due_ms)
    }

    /// Cancel calibration and freeze the estimate. Idempotent.
    pub fn dispose(&mut self) {
        if self.schedule.take().is_some() {
            debug!(meter = %self.name, "meter disposed");
        }
        self.estimator.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.estimator.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::estimator::Phase;

    fn meter() -> (Meter<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0.0);
        let m = Meter::new("frames", MeterConfig::default(), clock.clone()).unwrap();
        (m, clock)
    }

    fn run(m: &mut Meter<ManualClock>, clock: &ManualClock, interval: f64, count: usize) {
        for _ in 0..count {
            clock.advance(interval);
            m.sample();
        }
    }

    #[test]
    fn calibration_is_armed_only_after_seeding() {
        let (mut m, clock) = meter();
        m.sample();
        run(&mut m, &clock, 16.667, 10);
        assert_eq!(m.next_calibration_ms(), None);
        clock.advance(5000.0);
        assert_eq!(m.poll(), 0);
        assert_eq!(m.estimator().calibrations(), 0);
    }

    #[test]
    fn calibration_follows_rate_change() {
        let (mut m, clock) = meter();
        m.sample();
        run(&mut m, &clock, 16.667, 600);
        assert_eq!(m.snapshot().decay_samples, Some(180));

        run(&mut m, &clock, 100.0, 900);
        assert!(m.estimator().calibrations() > 0);
        let snap = m.snapshot();
        let interval = snap.estimate.interval_ms().unwrap();
        assert!((interval - 100.0).abs() < 1.0);
        let n = snap.decay_samples.unwrap();
        // the window stays near 3000 ms of wall clock
        assert!((f64::from(n) * interval - 3000.0).abs() < 3.0 * interval);
        assert!(n < 180);
    }

    #[test]
    fn stalled_stream_freezes_estimate() {
        let (mut m, clock) = meter();
        m.sample();
        run(&mut m, &clock, 20.0, 500);
        let before = m.read();
        clock.advance(120_000.0);
        assert!(m.poll() > 0);
        assert_eq!(m.read(), before);
        assert_eq!(m.estimator().phase(), Phase::SteadyState);
    }

    #[test]
    fn disposed_meter_stays_frozen() {
        let (mut m, clock) = meter();
        m.sample();
        run(&mut m, &clock, 16.667, 300);
        m.dispose();
        let frozen = m.snapshot();
        assert_eq!(m.next_calibration_ms(), None);

        clock.advance(60_000.0);
        assert_eq!(m.poll(), 0);
        run(&mut m, &clock, 50.0, 200);
        assert_eq!(m.snapshot(), frozen);
        m.dispose();
        assert!(m.is_disposed());
    }

    #[test]
    fn independent_meters_do_not_interfere() {
        let clock = ManualClock::new(0.0);
        let mut fast = Meter::new("fast", MeterConfig::default(), clock.clone()).unwrap();
        let mut slow = Meter::new("slow", MeterConfig::default(), clock.clone()).unwrap();
        fast.sample();
        slow.sample();
        for i in 1..=3000 {
            clock.advance(10.0);
            fast.sample();
            if i % 5 == 0 {
                slow.sample();
            }
        }
        assert!((fast.read().interval_ms().unwrap() - 10.0).abs() < 0.1);
        assert!((slow.read().interval_ms().unwrap() - 50.0).abs() < 0.5);
    }
}
