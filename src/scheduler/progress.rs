/// Tracks the last reconciliation instant and turns elapsed time into work.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    last_update: f64,
}

impl ProgressTracker {
    pub fn new(start: f64) -> Self {
        Self { last_update: start }
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    /// Move the reconciliation mark to `now`. Returns the elapsed time, or
    /// `None` when `now` is not after the previous mark; repeated or
    /// out-of-order calls therefore never count progress twice.
    pub fn advance(&mut self, now: f64) -> Option<f64> {
        let elapsed = now - self.last_update;
        if !(elapsed > 0.0) {
            return None;
        }
        self.last_update = now;
        Some(elapsed)
    }
}

/// Work one job completes in `elapsed` seconds at `rate` while
/// `load_fraction` of the resource is taken by background load.
pub fn work_done(elapsed: f64, rate: f64, load_fraction: f64) -> f64 {
    let load = if load_fraction.is_nan() { 0.0 } else { load_fraction.clamp(0.0, 1.0) };
    let available = 1.0 - load;
    (elapsed * rate * available).max(0.0)
}
