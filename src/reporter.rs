use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{self as channel, Sender};
use tracing::{debug, warn};

use crate::estimator::{Estimate, Snapshot};
use crate::registry::MeterRegistry;

/// Human-facing rate: `"60 fps"`, or `"- fps"` while unavailable.
pub fn render_rate(estimate: &Estimate, unit: &str) -> String {
    match estimate.rate_hz() {
        Some(hz) if hz.is_finite() => format!("{} {unit}", hz.round()),
        _ => format!("- {unit}"),
    }
}

/// One text line per meter for logs and plain output.
pub fn render_line(snap: &Snapshot, unit: &str) -> String {
    let rate = render_rate(&snap.estimate, unit);
    match (snap.estimate.interval_ms(), snap.decay_samples) {
        (Some(ms), Some(n)) => format!("{}: {rate} ({ms:.2} ms, N={n})", snap.name),
        _ => format!("{}: {rate} ({})", snap.name, snap.phase),
    }
}

/// Periodic reader: snapshots every meter in the registry on a fixed
/// cadence and pushes the batch to `out`.
pub struct Reporter {
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Reporter {
    pub fn spawn(
        registry: Arc<MeterRegistry>,
        interval: Duration,
        out: Sender<Vec<Snapshot>>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let handle = thread::Builder::new().name("reporter".into()).spawn(move || {
            let ticker = channel::tick(interval);
            loop {
                channel::select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if out.send(registry.snapshot()).is_err() {
                            // consumer went away
                            break;
                        }
                    }
                }
            }
            debug!("reporter stopped");
        })?;
        Ok(Self { stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("reporter thread panicked");
            }
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.stop();
    }
}
