//! Streaming latency statistics.

use std::fmt;
use std::time::Duration;

/// Online mean over an unbounded sequence of samples.
///
/// `update` is O(1) in time and memory. One instance has a single writer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    steps: u64,
    mean: f64,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the mean.
    pub fn update(&mut self, sample: f64) {
        self.steps += 1;
        self.mean += (sample - self.mean) / self.steps as f64;
    }

    /// Mean of every sample seen so far, `0.0` before the first one.
    pub fn value(&self) -> f64 {
        self.mean
    }

    pub fn num_steps(&self) -> u64 {
        self.steps
    }
}

impl fmt::Display for RunningAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "running_average{{size={}, value={}}}", self.steps, self.mean)
    }
}

/// Milliseconds in `elapsed`, as a sample value.
#[inline]
pub(crate) fn millis(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_samples() {
        let mut avg = RunningAverage::new();
        for sample in [2.0, 4.0, 6.0] {
            avg.update(sample);
        }
        assert_eq!(avg.value(), 4.0);
        assert_eq!(avg.num_steps(), 3);
    }

    #[test]
    fn test_empty_average() {
        let avg = RunningAverage::new();
        assert_eq!(avg.value(), 0.0);
        assert_eq!(avg.num_steps(), 0);
    }

    #[test]
    fn test_long_sequence_stays_accurate() {
        let mut avg = RunningAverage::new();
        for i in 1..=10_000 {
            avg.update(i as f64);
        }
        assert!((avg.value() - 5_000.5).abs() < 1e-6);
    }

    #[test]
    fn test_display() {
        let mut avg = RunningAverage::new();
        avg.update(1.5);
        avg.update(2.5);
        assert_eq!(avg.to_string(), "running_average{size=2, value=2}");
    }

    #[test]
    fn test_millis() {
        assert_eq!(millis(Duration::from_micros(1_500)), 1.5);
    }
}
