//! Bounded moving-average history for smoothed metrics.
//!
//! Salt and chlorine readings jump around from cycle to cycle (the probe
//! sits in moving water), so both are reported as the mean of a short FIFO
//! of recent samples. The buffers live on the long-lived [`Probe`] and
//! persist across update cycles; they are not persisted across process
//! restarts.
//!
//! [`Probe`]: crate::session::Probe

use std::collections::VecDeque;

/// Base history depth; the chlorine buffer uses it directly and the salt
/// buffer uses twice this.
pub const MAX_HISTORY_LEN: usize = 3;

/// A bounded FIFO of recent samples for one metric.
///
/// Length never exceeds the configured capacity; the oldest sample is
/// evicted on overflow.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create a buffer holding up to `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Arithmetic mean of the current contents, or `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples the buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// The per-probe smoothing buffers threaded across update cycles.
#[derive(Debug, Clone)]
pub struct SmoothingState {
    /// Salt samples, ppm. Deeper than chlorine: salt drifts slowly and
    /// benefits from a longer window.
    pub salt: HistoryBuffer,
    /// Chlorine samples, ppm.
    pub chlorine: HistoryBuffer,
}

impl Default for SmoothingState {
    fn default() -> Self {
        Self {
            salt: HistoryBuffer::new(MAX_HISTORY_LEN * 2),
            chlorine: HistoryBuffer::new(MAX_HISTORY_LEN),
        }
    }
}

impl SmoothingState {
    /// Drop all accumulated samples (e.g. after probe recalibration).
    pub fn reset(&mut self) {
        self.salt.clear();
        self.chlorine.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_buffer_has_no_mean() {
        let buffer = HistoryBuffer::new(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.mean(), None);
    }

    #[test]
    fn test_mean_tracks_contents() {
        let mut buffer = HistoryBuffer::new(3);
        buffer.push(1.0);
        assert_eq!(buffer.mean(), Some(1.0));
        buffer.push(2.0);
        assert_eq!(buffer.mean(), Some(1.5));
        buffer.push(3.0);
        assert_eq!(buffer.mean(), Some(2.0));
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        let mut buffer = HistoryBuffer::new(3);
        for sample in [1.0, 2.0, 3.0, 4.0, 5.0] {
            buffer.push(sample);
        }
        // Only [3, 4, 5] remain
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.mean(), Some(4.0));
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let mut buffer = HistoryBuffer::new(0);
        buffer.push(7.0);
        buffer.push(9.0);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.mean(), Some(9.0));
    }

    #[test]
    fn test_clear() {
        let mut buffer = HistoryBuffer::new(2);
        buffer.push(1.0);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.mean(), None);
    }

    #[test]
    fn test_smoothing_state_capacities() {
        let state = SmoothingState::default();
        assert_eq!(state.salt.capacity(), 6);
        assert_eq!(state.chlorine.capacity(), 3);
    }

    #[test]
    fn test_smoothing_state_reset() {
        let mut state = SmoothingState::default();
        state.salt.push(100.0);
        state.chlorine.push(0.5);
        state.reset();
        assert!(state.salt.is_empty());
        assert!(state.chlorine.is_empty());
    }

    proptest! {
        /// Length never exceeds capacity, however many samples arrive.
        #[test]
        fn len_never_exceeds_capacity(
            capacity in 1usize..16,
            samples in proptest::collection::vec(-1e6f64..1e6, 0..64),
        ) {
            let mut buffer = HistoryBuffer::new(capacity);
            for sample in &samples {
                buffer.push(*sample);
                prop_assert!(buffer.len() <= capacity);
            }
        }

        /// The mean always lies within the range of retained samples, and
        /// the retained samples are exactly the most recent ones.
        #[test]
        fn mean_matches_tail(
            capacity in 1usize..8,
            samples in proptest::collection::vec(-1e6f64..1e6, 1..32),
        ) {
            let mut buffer = HistoryBuffer::new(capacity);
            for sample in &samples {
                buffer.push(*sample);
            }
            let tail: Vec<f64> = samples
                .iter()
                .rev()
                .take(capacity)
                .rev()
                .copied()
                .collect();
            let expected = tail.iter().sum::<f64>() / tail.len() as f64;
            let mean = buffer.mean().unwrap();
            prop_assert!((mean - expected).abs() <= expected.abs() * 1e-12 + 1e-9);
        }
    }
}
