/// Rope line: midpoint of the highest high and lowest low over the trailing
/// `period` bars, the current bar included.
///
/// `rope = (HHV(high, period) + LLV(low, period)) / 2`
#[derive(Debug, Clone)]
pub struct RopeIndicator {
    pub period: usize,
}

impl RopeIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "Rope period must be >= 1");
        Self { period }
    }

    /// Compute the rope midline from parallel high/low slices (oldest first).
    /// Returns `None` if either slice holds fewer than `period` values.
    pub fn compute(&self, highs: &[f64], lows: &[f64]) -> Option<f64> {
        if highs.len() < self.period || lows.len() < self.period {
            return None;
        }
        let highest = highs[highs.len() - self.period..]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = lows[lows.len() - self.period..]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        Some((highest + lowest) / 2.0)
    }
}
