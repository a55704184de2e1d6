use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{self as channel, Sender};
use tracing::debug;

use crate::calibrator::{CalibrationSchedule, Calibrator};
use crate::clock::Clock;
use crate::config::MeterConfig;
use crate::estimator::{Estimate, RateEstimator, Snapshot, Transition};
use crate::MeterError;

/// Thread-safe meter. Every mutation of the estimator goes through one
/// mutex; calibration runs on its own ticker thread.
pub struct SharedMeter {
    name: String,
    clock: Arc<dyn Clock>,
    estimator: Arc<Mutex<RateEstimator>>,
    steady_tx: Sender<()>,
    calibrator: Mutex<Calibrator>,
}

impl SharedMeter {
    pub fn new(name: impl Into<String>, config: MeterConfig, clock: Arc<dyn Clock>) -> Result<Self, MeterError> {
        let name = name.into();
        let schedule = CalibrationSchedule::new(&config);
        let estimator = Arc::new(Mutex::new(RateEstimator::new(config)?));
        let (steady_tx, steady_rx) = channel::bounded::<()>(1);
        let calibrator = Calibrator::spawn(&name, Arc::clone(&estimator), steady_rx, schedule)
            .map_err(MeterError::Spawn)?;
        Ok(Self {
            name,
            clock,
            estimator,
            steady_tx,
            calibrator: Mutex::new(calibrator),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, RateEstimator> {
        // a panic mid-update leaves plain numbers behind; keep serving them
        self.estimator.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one occurrence of the measured event.
    pub fn sample(&self) {
        // timestamps must be taken in lock order or intervals go negative
        let transition = {
            let mut est = self.lock();
            est.record(self.clock.now_ms())
        };
        if let Transition::Steady { .. } = transition {
            let _ = self.steady_tx.try_send(());
        }
    }

    pub fn read(&self) -> Estimate {
        self.lock().estimate()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot(&self.name)
    }

    /// Freeze the estimate and stop the calibration thread. Once this
    /// returns no further recalibration can run. Idempotent.
    pub fn dispose(&self) {
        self.lock().dispose();
        let mut calibrator = self.calibrator.lock().unwrap_or_else(|e| e.into_inner());
        if calibrator.is_running() {
            calibrator.stop();
            debug!(meter = %self.name, "meter disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().is_disposed()
    }
}

impl Drop for SharedMeter {
    fn drop(&mut self) {
        self.dispose();
    }
}
