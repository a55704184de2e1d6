/// Bootstrap accumulator: averages the first burst of intervals until
/// enough wall-clock time has passed to trust the result.
#[derive(Clone, Debug)]
pub struct Seeder {
    epoch_ms: f64,
    events: u64,
}

impl Seeder {
    pub fn start(epoch_ms: f64) -> Self {
        Self { epoch_ms, events: 0 }
    }

    /// Count one more interval ending at `ts_ms`. Returns the average
    /// interval once elapsed time exceeds `seed_duration_ms`.
    pub fn observe(&mut self, ts_ms: f64, seed_duration_ms: f64) -> Option<f64> {
        self.events += 1;
        let elapsed = ts_ms - self.epoch_ms;
        if elapsed > seed_duration_ms {
            Some(elapsed / self.events as f64)
        } else {
            None
        }
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn epoch_ms(&self) -> f64 {
        self.epoch_ms
    }
}
