use serde::Serialize;

/// Running arithmetic mean over every sample folded so far.
///
/// History is not kept: each update rescales the previous mean. This is the
/// plain online mean rather than Welford's form, so precision drifts slowly
/// once `count` gets very large.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningAverage {
    mean: f64,
    count: u64,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample in and return the new mean.
    pub fn update(&mut self, value: f64) -> f64 {
        let n = self.count as f64;
        self.mean = (self.mean * n + value) / (n + 1.0);
        self.count += 1;
        self.mean
    }

    /// Current mean; `0.0` before the first sample.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let avg = RunningAverage::new();
        assert_eq!(avg.mean(), 0.0);
        assert_eq!(avg.count(), 0);
    }

    #[test]
    fn tracks_arithmetic_mean() {
        let mut avg = RunningAverage::new();
        assert_eq!(avg.update(5.0), 5.0);
        assert_eq!(avg.update(2.0), 3.5);
        avg.update(4.0);
        assert_eq!(avg.update(15.0), 6.5);
        assert_eq!(avg.count(), 4);
    }

    #[test]
    fn matches_direct_mean_for_longer_sequences() {
        let values: Vec<f64> = (0..1000).map(|i| ((i * 37) % 101) as f64).collect();
        let mut avg = RunningAverage::new();
        for v in &values {
            avg.update(*v);
        }

        let expected = values.iter().sum::<f64>() / values.len() as f64;
        assert!((avg.mean() - expected).abs() < 1e-9);
    }
}
