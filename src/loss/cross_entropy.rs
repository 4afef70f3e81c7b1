use crate::error::Result;
use crate::loss::loss_function::{softmax_channels, target_classes, LossFunction, LossOutput};
use crate::math::tensor::Tensor;

/// Voxel-wise categorical cross-entropy over softmax probabilities,
/// averaged over every voxel of every volume in the batch.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f32 = 1e-12;

impl CrossEntropyLoss {
    /// Loss and gradient from precomputed probabilities. Shared with the
    /// Dice + CE combination so the softmax is evaluated once.
    pub(crate) fn from_probs(probs: &Tensor, classes_of: &[usize]) -> LossOutput {
        let (batch, classes, spatial) = (probs.batch_size(), probs.channels(), probs.spatial_len());
        let n = (batch * spatial).max(1) as f32;
        let mut value = 0.0;
        // ∂L/∂z = (p - onehot) / N for the combined softmax + CE.
        let mut grad = probs.map(|p| p / n);
        for b in 0..batch {
            for v in 0..spatial {
                let y = classes_of[b * spatial + v];
                let idx = b * classes * spatial + y * spatial + v;
                value -= (probs.data[idx] + EPS).ln();
                grad.data[idx] -= 1.0 / n;
            }
        }
        LossOutput { value: value / n, grad }
    }
}

impl LossFunction for CrossEntropyLoss {
    fn compute(&self, logits: &Tensor, target: &Tensor) -> Result<LossOutput> {
        let classes_of = target_classes(logits, target)?;
        Ok(CrossEntropyLoss::from_probs(&softmax_channels(logits), &classes_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_logits_give_log_of_class_count() {
        let logits = Tensor::zeros(&[2, 4, 3]);
        let target = Tensor::from_data(vec![2, 1, 3], vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0]).unwrap();
        let out = CrossEntropyLoss.compute(&logits, &target).unwrap();
        assert!((out.value - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut logits = Tensor::from_data(vec![1, 3, 2], vec![0.2, -0.4, 1.1, 0.3, -0.7, 0.5]).unwrap();
        let target = Tensor::from_data(vec![1, 1, 2], vec![2.0, 0.0]).unwrap();
        let analytic = CrossEntropyLoss.compute(&logits, &target).unwrap().grad;
        let h = 1e-3;
        for k in 0..logits.len() {
            let orig = logits.data[k];
            logits.data[k] = orig + h;
            let up = CrossEntropyLoss.compute(&logits, &target).unwrap().value;
            logits.data[k] = orig - h;
            let down = CrossEntropyLoss.compute(&logits, &target).unwrap().value;
            logits.data[k] = orig;
            assert!(((up - down) / (2.0 * h) - analytic.data[k]).abs() < 1e-3);
        }
    }
}
