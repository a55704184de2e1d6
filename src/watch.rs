use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use ratemeter::estimator::Snapshot;
use ratemeter::reporter::{render_rate, Reporter};
use ratemeter::{MeterConfig, MeterRegistry, MonotonicClock, SharedMeter};

use crate::cli::{OutputFormat, Watch};
use crate::tui::run_overlay;

pub fn run_watch(watch: Watch) -> Result<()> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }
    run_watch_with_shutdown(watch, stop_flag)
}

fn interval_for(hz: f64) -> Result<Duration> {
    if !hz.is_finite() || hz <= 0.0 {
        bail!("driver rate must be a positive number of hertz (got {hz})");
    }
    Ok(Duration::from_secs_f64(1.0 / hz))
}

pub(crate) fn run_watch_with_shutdown(watch: Watch, stop_flag: Arc<AtomicBool>) -> Result<()> {
    let config = MeterConfig::from(&watch.meter);
    let base = interval_for(watch.hz)?;
    let stepped = watch.step_hz.map(interval_for).transpose()?;
    let step_after = Duration::from_secs_f64(watch.step_after_secs.max(0.0));

    let clock = Arc::new(MonotonicClock::new());
    let meter = Arc::new(SharedMeter::new(watch.name.clone(), config.clone(), clock)?);
    let registry = Arc::new(MeterRegistry::new());
    registry.insert(Arc::clone(&meter));
    info!(meter = %watch.name, hz = watch.hz, step_hz = ?watch.step_hz, "Starting ratemeter");

    // Sample driver: one sample per tick of the simulated loop
    let stop_driver = stop_flag.clone();
    let driver_meter = Arc::clone(&meter);
    let driver = thread::Builder::new()
        .name("driver".into())
        .spawn(move || {
            let started = Instant::now();
            let mut next = started;
            while !stop_driver.load(Ordering::Relaxed) {
                driver_meter.sample();
                let interval = match stepped {
                    Some(s) if started.elapsed() >= step_after => s,
                    _ => base,
                };
                next += interval;
                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                } else {
                    // fell behind; do not try to catch up with a burst
                    next = now;
                }
            }
        })
        .context("Spawning sample driver thread")?;

    let (report_tx, report_rx) = channel::bounded::<Vec<Snapshot>>(16);
    let mut reporter = Reporter::spawn(Arc::clone(&registry), config.report_interval(), report_tx)
        .context("Spawning reporter thread")?;

    let result = if watch.plain {
        print_reports(&report_rx, &stop_flag, watch.format, &watch.meter.unit)
    } else {
        run_overlay(report_rx, stop_flag.clone(), &watch.meter.unit)
    };

    stop_flag.store(true, Ordering::Relaxed);
    join_logged(driver, "sample driver");
    reporter.stop();
    registry.dispose();
    debug!("watch finished");
    result
}

/// Wait for a worker thread, reporting whether it exited cleanly.
fn join_logged(handle: thread::JoinHandle<()>, what: &str) -> bool {
    if handle.join().is_err() {
        warn!("{what} thread panicked");
        return false;
    }
    true
}

fn log_batch(batch: &[Snapshot], unit: &str) {
    for snap in batch {
        info!(
            meter = %snap.name,
            rate = %render_rate(&snap.estimate, unit),
            interval_ms = ?snap.estimate.interval_ms(),
            decay_samples = ?snap.decay_samples,
            phase = %snap.phase,
            "Rate"
        );
    }
}

fn print_reports(
    rx: &channel::Receiver<Vec<Snapshot>>,
    stop: &AtomicBool,
    format: OutputFormat,
    unit: &str,
) -> Result<()> {
    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(batch) => match format {
                OutputFormat::Text => log_batch(&batch, unit),
                OutputFormat::Json => println!("{}", serde_json::to_string(&batch)?),
            },
            Err(channel::RecvTimeoutError::Timeout) => {}
            Err(channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ratemeter::estimator::{Estimate, Phase};

    use super::*;
    use crate::cli::MeterArgs;

    fn watch_args(hz: f64) -> Watch {
        Watch {
            hz,
            step_hz: None,
            step_after_secs: 10.0,
            name: "loop".into(),
            plain: true,
            format: OutputFormat::Json,
            meter: MeterArgs {
                target_window_ms: 3000.0,
                seed_duration_ms: 400.0,
                report_interval_ms: 50.0,
                calibration_initial_delay_ms: 1000.0,
                calibration_backoff_factor: 1.2,
                calibration_max_delay_ms: 30_000.0,
                unit: "fps".into(),
            },
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn text_reports_go_through_tracing() {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();
        let snap = Snapshot {
            name: "frames".into(),
            phase: Phase::SteadyState,
            estimate: Estimate::Interval { interval_ms: 16.667 },
            rate_hz: Some(60.0),
            decay_samples: Some(180),
            samples: 500,
            calibrations: 3,
        };
        tracing::subscriber::with_default(subscriber, || log_batch(&[snap], "fps"));
        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("INFO"));
        assert!(logged.contains("meter=frames"));
        assert!(logged.contains("rate=60 fps"));
        assert!(logged.contains("decay_samples=Some(180)"));
    }

    #[test]
    fn panicking_driver_is_reported() {
        let ok = thread::spawn(|| {});
        assert!(join_logged(ok, "test"));
        let bad = thread::spawn(|| panic!("driver failed"));
        assert!(!join_logged(bad, "test"));
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(interval_for(0.0).is_err());
        assert!(interval_for(-5.0).is_err());
        assert_eq!(interval_for(50.0).unwrap(), Duration::from_millis(20));
    }

    #[test]
    fn bad_config_fails_before_spawning() {
        let mut args = watch_args(60.0);
        args.meter.seed_duration_ms = 0.0;
        let err = run_watch_with_shutdown(args, Arc::new(AtomicBool::new(false))).unwrap_err();
        assert!(err.chain().any(|c| c.is::<ratemeter::MeterError>()));
    }

    #[test]
    fn stops_when_flag_is_set() {
        let stop = Arc::new(AtomicBool::new(false));
        let stopper = stop.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            stopper.store(true, Ordering::Relaxed);
        });
        run_watch_with_shutdown(watch_args(200.0), stop).unwrap();
        t.join().unwrap();
    }
}
