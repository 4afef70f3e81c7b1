use crate::error::Result;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::loss_function::{softmax_channels, target_classes, LossFunction, LossOutput};
use crate::math::tensor::Tensor;

/// Soft Dice plus cross-entropy on softmax probabilities.
///
/// Dice is computed per (volume, class) pair over all voxels, background
/// included, then averaged:
///   D = 1 - (2·Σ p·g + s) / (Σ p + Σ g + s)
/// The total is `dice_weight · D + ce_weight · CE`.
#[derive(Debug, Clone)]
pub struct DiceCeLoss {
    pub smooth: f32,
    pub dice_weight: f32,
    pub ce_weight: f32,
}

impl Default for DiceCeLoss {
    fn default() -> Self {
        DiceCeLoss { smooth: 1e-5, dice_weight: 1.0, ce_weight: 1.0 }
    }
}

impl DiceCeLoss {
    /// Dice term and its gradient with respect to the probabilities.
    fn dice(&self, probs: &Tensor, classes_of: &[usize]) -> (f32, Vec<f32>) {
        let (batch, classes, spatial) = (probs.batch_size(), probs.channels(), probs.spatial_len());
        let pairs = (batch * classes).max(1) as f32;
        let mut value = 0.0;
        let mut grad = vec![0.0; probs.len()];

        for b in 0..batch {
            let labels = &classes_of[b * spatial..(b + 1) * spatial];
            for c in 0..classes {
                let base = (b * classes + c) * spatial;
                let p = &probs.data[base..base + spatial];
                let (mut inter, mut p_sum, mut g_sum) = (0.0f32, 0.0f32, 0.0f32);
                for (v, &pv) in p.iter().enumerate() {
                    let g = if labels[v] == c { 1.0 } else { 0.0 };
                    inter += pv * g;
                    p_sum += pv;
                    g_sum += g;
                }
                let num = 2.0 * inter + self.smooth;
                let den = p_sum + g_sum + self.smooth;
                value += 1.0 - num / den;

                // ∂D/∂p_v = -(2·g_v·den - num) / den²
                for v in 0..spatial {
                    let g = if labels[v] == c { 1.0 } else { 0.0 };
                    grad[base + v] = -(2.0 * g * den - num) / (den * den) / pairs;
                }
            }
        }
        (value / pairs, grad)
    }
}

impl LossFunction for DiceCeLoss {
    fn compute(&self, logits: &Tensor, target: &Tensor) -> Result<LossOutput> {
        let classes_of = target_classes(logits, target)?;
        let probs = softmax_channels(logits);
        let ce = CrossEntropyLoss::from_probs(&probs, &classes_of);
        let (dice, dice_grad_p) = self.dice(&probs, &classes_of);

        // Chain the Dice gradient through the softmax Jacobian:
        //   ∂L/∂z_c = p_c · (∂L/∂p_c - Σ_k p_k · ∂L/∂p_k)
        let (batch, classes, spatial) = (probs.batch_size(), probs.channels(), probs.spatial_len());
        let mut grad = ce.grad.map(|g| g * self.ce_weight);
        for b in 0..batch {
            let base = b * classes * spatial;
            for v in 0..spatial {
                let idx = |c: usize| base + c * spatial + v;
                let dot: f32 = (0..classes).map(|k| probs.data[idx(k)] * dice_grad_p[idx(k)]).sum();
                for c in 0..classes {
                    let dz = probs.data[idx(c)] * (dice_grad_p[idx(c)] - dot);
                    grad.data[idx(c)] += self.dice_weight * dz;
                }
            }
        }

        Ok(LossOutput {
            value: self.dice_weight * dice + self.ce_weight * ce.value,
            grad,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> (Tensor, Tensor) {
        let logits = Tensor::from_data(
            vec![2, 3, 2],
            vec![0.2, -0.4, 1.1, 0.3, -0.7, 0.5, 0.9, 0.1, -0.2, 0.4, 0.6, -1.0],
        ).unwrap();
        let target = Tensor::from_data(vec![2, 1, 2], vec![2.0, 0.0, 1.0, 1.0]).unwrap();
        (logits, target)
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let (mut logits, target) = case();
        let loss = DiceCeLoss::default();
        let analytic = loss.compute(&logits, &target).unwrap().grad;
        let h = 1e-3;
        for k in 0..logits.len() {
            let orig = logits.data[k];
            logits.data[k] = orig + h;
            let up = loss.compute(&logits, &target).unwrap().value;
            logits.data[k] = orig - h;
            let down = loss.compute(&logits, &target).unwrap().value;
            logits.data[k] = orig;
            let numeric = (up - down) / (2.0 * h);
            assert!((numeric - analytic.data[k]).abs() < 2e-3, "z[{k}]: {numeric} vs {}", analytic.data[k]);
        }
    }

    #[test]
    fn confident_correct_prediction_scores_lower_than_wrong_one() {
        let target = Tensor::from_data(vec![1, 1, 2], vec![0.0, 1.0]).unwrap();
        let right = Tensor::from_data(vec![1, 2, 2], vec![8.0, -8.0, -8.0, 8.0]).unwrap();
        let wrong = Tensor::from_data(vec![1, 2, 2], vec![-8.0, 8.0, 8.0, -8.0]).unwrap();
        let loss = DiceCeLoss::default();
        let good = loss.compute(&right, &target).unwrap().value;
        let bad = loss.compute(&wrong, &target).unwrap().value;
        assert!(good < 0.01, "near-perfect prediction should have near-zero loss, got {good}");
        assert!(bad > good);
    }
}
