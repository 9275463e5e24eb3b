//! Rolling window over classifier outputs.
//!
//! Each decoded frame yields one obstacle probability. The smoother keeps the
//! last `W` of them and emits their sum once the window is full, one emission
//! per enqueue from then on. The control side divides by `W` to recover the
//! average, so the wire value is the raw sum.

use std::collections::VecDeque;

/// Window length used by the deployed pipeline.
pub const DEFAULT_WINDOW: usize = 5;

/// Emissions between full re-summations of the window.
const RESUM_FACTOR: u64 = 1024;

#[derive(Clone, Debug)]
pub struct RollingSmoother {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    emissions: u64,
}

impl RollingSmoother {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
            emissions: 0,
        }
    }

    /// Add a sample. Returns the windowed sum once the window is full.
    pub fn enqueue(&mut self, sample: f64) -> Option<f64> {
        if self.window.len() < self.capacity - 1 {
            self.window.push_back(sample);
            self.sum += sample;
            return None;
        }

        if self.window.len() == self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }
        self.window.push_back(sample);
        self.sum += sample;
        self.emissions += 1;

        // Incremental add/subtract accumulates rounding error over long runs.
        if self.emissions % (self.capacity as u64 * RESUM_FACTOR) == 0 {
            self.sum = self.window.iter().sum();
        }
        Some(self.sum)
    }

    /// Samples currently held, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once enqueues produce emissions.
    pub fn is_warm(&self) -> bool {
        self.window.len() == self.capacity
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Running average over the held samples, `0.0` when empty.
    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }
}

impl Default for RollingSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn warm_up_emits_nothing_then_window_sum() {
        let mut smoother = RollingSmoother::default();
        for sample in [0.1, 0.2, 0.3, 0.4] {
            assert_eq!(smoother.enqueue(sample), None);
        }
        assert!(!smoother.is_warm());

        let first = smoother.enqueue(0.5).unwrap();
        assert!(close(first, 1.5), "got {}", first);
        assert!(smoother.is_warm());

        let second = smoother.enqueue(0.6).unwrap();
        assert!(close(second, 2.0), "got {}", second);
        assert_eq!(smoother.len(), 5);
    }

    #[test]
    fn emission_matches_exact_window_sum_over_long_run() {
        let mut smoother = RollingSmoother::new(5);
        let samples: Vec<f64> = (0..20_000).map(|i| ((i * 37) % 101) as f64 / 100.0).collect();

        for (i, &sample) in samples.iter().enumerate() {
            let emitted = smoother.enqueue(sample);
            if i < 4 {
                assert!(emitted.is_none());
                continue;
            }
            let expected: f64 = samples[i - 4..=i].iter().sum();
            let emitted = emitted.unwrap();
            assert!((emitted - expected).abs() < 1e-9, "step {}: {} vs {}", i, emitted, expected);
        }
    }

    #[test]
    fn window_of_one_emits_every_sample() {
        let mut smoother = RollingSmoother::new(1);
        assert_eq!(smoother.enqueue(0.25), Some(0.25));
        assert_eq!(smoother.enqueue(0.75), Some(0.75));
    }

    #[test]
    fn window_holds_latest_samples_oldest_first() {
        let mut smoother = RollingSmoother::new(3);
        for sample in [1.0, 2.0, 3.0, 4.0] {
            smoother.enqueue(sample);
        }
        assert_eq!(smoother.window().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert!(close(smoother.average(), 3.0));
    }
}
