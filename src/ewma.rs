/// Intervals at or below zero are replaced by this before averaging.
pub const MIN_INTERVAL_MS: f64 = 0.001;

/// Single-pole exponential filter over a sample count `N`.
///
/// Each update keeps `e^(-1/N)` of the previous value, so roughly 63% of the
/// weight sits on the most recent `N` samples.
#[derive(Clone, Debug)]
pub struct IntervalAverager {
    size: u32,
    c_prev: f64,
    c_next: f64,
    value: f64,
}

fn coefficients(size: u32) -> (f64, f64) {
    let c_prev = (-1.0 / f64::from(size)).exp();
    (c_prev, 1.0 - c_prev)
}

impl IntervalAverager {
    /// `size` of zero is treated as one.
    pub fn new(size: u32, seed: f64) -> Self {
        let size = size.max(1);
        let (c_prev, c_next) = coefficients(size);
        Self { size, c_prev, c_next, value: seed }
    }

    pub fn update(&mut self, interval_ms: f64) -> f64 {
        let m = if interval_ms.is_finite() && interval_ms > 0.0 { interval_ms } else { MIN_INTERVAL_MS };
        self.value = self.value * self.c_prev + m * self.c_next;
        self.value
    }

    /// Swap the decay constant for future updates; the current value is kept.
    pub fn resize(&mut self, size: u32) {
        self.size = size.max(1);
        (self.c_prev, self.c_next) = coefficients(self.size);
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// `ceil(window / interval)` as a sample count, never below one.
pub fn samples_for_window(window_ms: f64, interval_ms: f64) -> u32 {
    let n = (window_ms / interval_ms).ceil();
    // `as` saturates for out-of-range floats and maps NaN to zero
    (n as u32).max(1)
}
