use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, Sender};
use tracing::{debug, warn};

use crate::config::MeterConfig;
use crate::estimator::RateEstimator;

/// Backoff schedule for recalibration: `initial * factor^k`, capped at `max`.
///
/// `k` stops growing once the cap is reached so it cannot overflow on
/// long-running meters.
#[derive(Clone, Debug)]
pub struct CalibrationSchedule {
    initial_ms: f64,
    factor: f64,
    max_ms: f64,
    exponent: u32,
    capped: bool,
    next_due_ms: Option<f64>,
}

impl CalibrationSchedule {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            initial_ms: config.calibration_initial_delay_ms,
            factor: config.calibration_backoff_factor,
            max_ms: config.calibration_max_delay_ms,
            exponent: 0,
            capped: false,
            next_due_ms: None,
        }
    }

    /// Delay before the next firing, advancing the backoff.
    pub fn next_delay_ms(&mut self) -> f64 {
        let raw = self.initial_ms * self.factor.powi(i32::try_from(self.exponent).unwrap_or(i32::MAX));
        if raw >= self.max_ms || !raw.is_finite() {
            self.capped = true;
            return self.max_ms;
        }
        if self.factor > 1.0 {
            self.exponent = self.exponent.saturating_add(1);
        }
        raw
    }

    pub fn next_delay(&mut self) -> Duration {
        Duration::from_secs_f64(self.next_delay_ms() / 1000.0)
    }

    /// Start the schedule at `now_ms`; the first firing is one initial delay away.
    pub fn arm(&mut self, now_ms: f64) {
        let delay = self.next_delay_ms();
        self.next_due_ms = Some(now_ms + delay);
    }

    pub fn disarm(&mut self) {
        self.next_due_ms = None;
    }

    pub fn next_due_ms(&self) -> Option<f64> {
        self.next_due_ms
    }

    /// Pop the next due time if it is at or before `now_ms`, rescheduling
    /// the following one relative to it.
    pub fn take_due(&mut self, now_ms: f64) -> Option<f64> {
        let due = self.next_due_ms?;
        if due > now_ms {
            return None;
        }
        let delay = self.next_delay_ms();
        self.next_due_ms = Some(due + delay);
        Some(due)
    }

    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    pub fn is_capped(&self) -> bool {
        self.capped
    }
}

/// Handle to a calibration ticker thread.
///
/// The thread waits for the steady-state signal, then recalibrates the
/// shared estimator on the backoff schedule until [`Calibrator::stop`].
pub struct Calibrator {
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Calibrator {
    pub fn spawn(
        name: &str,
        estimator: Arc<Mutex<RateEstimator>>,
        steady_rx: Receiver<()>,
        mut schedule: CalibrationSchedule,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(format!("calibrate-{name}"))
            .spawn(move || {
                channel::select! {
                    recv(stop_rx) -> _ => return,
                    recv(steady_rx) -> msg => if msg.is_err() { return; },
                }
                loop {
                    let delay = schedule.next_delay();
                    channel::select! {
                        recv(stop_rx) -> _ => break,
                        recv(channel::after(delay)) -> _ => {
                            let mut est = estimator.lock().unwrap_or_else(|e| e.into_inner());
                            if est.is_disposed() {
                                break;
                            }
                            est.recalibrate();
                        }
                    }
                }
                debug!("calibration ticker stopped");
            })?;
        Ok(Self { stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    /// Cancel pending recalibration and wait for the thread to exit.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects `stop_rx`, which wakes the select.
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("calibration thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Calibrator {
    fn drop(&mut self) {
        self.stop();
    }
}
