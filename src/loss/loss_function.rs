use crate::error::{Result, TrainError};
use crate::math::tensor::Tensor;

/// Scalar loss together with its gradient with respect to the logits.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f32,
    pub grad: Tensor,
}

impl LossOutput {
    /// Multiplies both the value and its gradient by `factor`.
    pub fn scaled(&self, factor: f32) -> LossOutput {
        LossOutput {
            value: self.value * factor,
            grad: self.grad.map(|g| g * factor),
        }
    }
}

/// Maps `(logits [B, C, ...], labels [B, 1, ...])` to a scalar loss.
///
/// Labels hold class indices stored as `f32`.
pub trait LossFunction {
    fn compute(&self, logits: &Tensor, target: &Tensor) -> Result<LossOutput>;
}

/// Channel-wise softmax of `[B, C, S...]` logits, numerically stabilized
/// by subtracting the per-voxel maximum.
pub fn softmax_channels(logits: &Tensor) -> Tensor {
    let (batch, classes, spatial) = (logits.batch_size(), logits.channels(), logits.spatial_len());
    let mut probs = logits.clone();
    for b in 0..batch {
        let base = b * classes * spatial;
        for v in 0..spatial {
            let idx = |c: usize| base + c * spatial + v;
            let max = (0..classes).map(|c| logits.data[idx(c)]).fold(f32::NEG_INFINITY, f32::max);
            let mut denom = 0.0;
            for c in 0..classes {
                let e = (logits.data[idx(c)] - max).exp();
                probs.data[idx(c)] = e;
                denom += e;
            }
            for c in 0..classes {
                probs.data[idx(c)] /= denom;
            }
        }
    }
    probs
}

/// Validates the label volume against the logits and returns one class
/// index per (batch, voxel) pair, batch-major.
pub fn target_classes(logits: &Tensor, target: &Tensor) -> Result<Vec<usize>> {
    let (batch, classes) = (logits.batch_size(), logits.channels());
    let mut expected = vec![batch, 1];
    expected.extend_from_slice(logits.spatial_shape());
    if target.shape != expected {
        return Err(TrainError::shape_mismatch(&expected, &target.shape));
    }
    target.data.iter()
        .map(|&y| {
            let class = y.round();
            if class < 0.0 || class as usize >= classes || (y - class).abs() > 1e-3 {
                Err(TrainError::model(format!("label {y} is not a class index below {classes}")))
            } else {
                Ok(class as usize)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_rows_sum_to_one() {
        let logits = Tensor::from_data(vec![1, 3, 2], vec![1.0, 50.0, 2.0, -50.0, 3.0, 0.0]).unwrap();
        let p = softmax_channels(&logits);
        for v in 0..2 {
            let total: f32 = (0..3).map(|c| p.data[c * 2 + v]).sum();
            assert!((total - 1.0).abs() < 1e-6);
        }
        assert!(p.is_finite());
    }

    #[test]
    fn target_classes_rejects_out_of_range_labels() {
        let logits = Tensor::zeros(&[1, 2, 3]);
        let good = Tensor::from_data(vec![1, 1, 3], vec![0.0, 1.0, 1.0]).unwrap();
        assert_eq!(target_classes(&logits, &good).unwrap(), vec![0, 1, 1]);
        let bad = Tensor::from_data(vec![1, 1, 3], vec![0.0, 2.0, 1.0]).unwrap();
        assert!(target_classes(&logits, &bad).is_err());
        let wrong_shape = Tensor::zeros(&[1, 3]);
        assert!(matches!(target_classes(&logits, &wrong_shape), Err(TrainError::ShapeMismatch { .. })));
    }
}
