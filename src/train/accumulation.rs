use crate::error::{Result, TrainError};

/// Decides when an accumulation window closes and what each mini-batch's
/// loss is divided by.
///
/// With window `A` and `T` batches in the epoch, batch `i` (0-based) closes
/// a window when `(i + 1) % A == 0` or when it is the last batch, so the
/// trailing partial window is always flushed before the epoch ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulationScheduler {
    window: usize,
    renormalize_partial: bool,
}

impl AccumulationScheduler {
    pub fn new(window: usize, renormalize_partial: bool) -> Result<Self> {
        if window == 0 {
            return Err(TrainError::config("batch_accumulation_iter must be at least 1"));
        }
        Ok(AccumulationScheduler { window, renormalize_partial })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn is_due(&self, batch_index: usize, total_batches: usize) -> bool {
        (batch_index + 1) % self.window == 0 || batch_index + 1 == total_batches
    }

    /// Divisor applied to the loss of batch `batch_index` before backward.
    ///
    /// Always the nominal window size, unless partial-window renormalization
    /// is on and the batch belongs to the epoch's trailing short window.
    pub fn loss_divisor(&self, batch_index: usize, total_batches: usize) -> f32 {
        if self.renormalize_partial {
            let window_start = batch_index - batch_index % self.window;
            let remaining = total_batches.saturating_sub(window_start);
            if remaining < self.window {
                return remaining.max(1) as f32;
            }
        }
        self.window as f32
    }

    /// Optimizer updates per epoch of `total_batches` batches.
    pub fn steps_per_epoch(&self, total_batches: usize) -> usize {
        total_batches.div_ceil(self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn due_indices(a: usize, t: usize) -> Vec<usize> {
        let s = AccumulationScheduler::new(a, false).unwrap();
        (0..t).filter(|&i| s.is_due(i, t)).collect()
    }

    #[test]
    fn partial_window_is_flushed_at_epoch_end() {
        assert_eq!(due_indices(3, 7), vec![2, 5, 6]);
        assert_eq!(due_indices(1, 4), vec![0, 1, 2, 3]);
        assert_eq!(due_indices(4, 4), vec![3]);
        assert_eq!(due_indices(5, 2), vec![1]);
    }

    #[test]
    fn divisor_is_nominal_by_default() {
        let s = AccumulationScheduler::new(3, false).unwrap();
        assert!((0..7).all(|i| s.loss_divisor(i, 7) == 3.0));
    }

    #[test]
    fn renormalized_divisor_uses_actual_partial_length() {
        let s = AccumulationScheduler::new(3, true).unwrap();
        let divisors: Vec<f32> = (0..8).map(|i| s.loss_divisor(i, 8)).collect();
        assert_eq!(divisors, vec![3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 2.0, 2.0]);
    }

    #[test]
    fn zero_window_is_a_configuration_error() {
        assert!(matches!(AccumulationScheduler::new(0, false), Err(TrainError::Config(_))));
    }

    proptest! {
        #[test]
        fn step_count_is_ceil_and_last_batch_always_steps(a in 1usize..12, t in 1usize..60) {
            let due = due_indices(a, t);
            let s = AccumulationScheduler::new(a, false).unwrap();
            prop_assert_eq!(due.len(), s.steps_per_epoch(t));
            prop_assert_eq!(due.len(), (t + a - 1) / a);
            prop_assert_eq!(due.last().copied(), Some(t - 1));
        }

        #[test]
        fn renormalized_window_weights_sum_to_one(a in 1usize..8, t in 1usize..40) {
            let s = AccumulationScheduler::new(a, true).unwrap();
            let mut sum = 0.0f32;
            for i in 0..t {
                sum += 1.0 / s.loss_divisor(i, t);
                if s.is_due(i, t) {
                    prop_assert!((sum - 1.0).abs() < 1e-5);
                    sum = 0.0;
                }
            }
        }
    }
}
