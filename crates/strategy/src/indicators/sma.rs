/// Simple moving average over the trailing `period` values.
#[derive(Debug, Clone)]
pub struct SmaIndicator {
    pub period: usize,
}

impl SmaIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self { period }
    }

    /// Arithmetic mean of the last `period` values (oldest first).
    /// Returns `None` if there are fewer than `period` values.
    pub fn compute(&self, values: &[f64]) -> Option<f64> {
        if values.len() < self.period {
            return None;
        }
        let tail = &values[values.len() - self.period..];
        Some(tail.iter().sum::<f64>() / self.period as f64)
    }
}
