use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::{Result, TrainError};

/// Dense row-major f32 tensor.
///
/// Volumes follow the channels-first convention `[B, C, D, H, W]`; the
/// leading dimension is always the batch dimension when a tensor travels
/// through the training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor::filled(shape, 0.0)
    }

    pub fn filled(shape: &[usize], value: f32) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    /// Builds a tensor from raw data, checking that the element count
    /// matches the shape.
    pub fn from_data(shape: Vec<usize>, data: Vec<f32>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TrainError::shape_mismatch(&shape, &[data.len()]));
        }
        Ok(Tensor { shape, data })
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    pub(crate) fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
        // (0, 1] avoids log(0).
        let u1: f32 = 1.0 - rng.gen::<f32>();
        let u2: f32 = 1.0 - rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// Normal initialization with standard deviation `sqrt(gain / fan_in)`.
    ///
    /// `gain = 2` is He initialization (ReLU family), `gain = 1` is Xavier.
    pub fn normal_init<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, gain: f32, rng: &mut R) -> Tensor {
        let std_dev = (gain / fan_in.max(1) as f32).sqrt();
        let mut res = Tensor::zeros(shape);
        for x in res.data.iter_mut() {
            *x = Tensor::sample_standard_normal(rng) * std_dev;
        }
        res
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the leading (batch) dimension.
    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Size of dimension 1 for `[B, C, ...]` tensors.
    pub fn channels(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(1)
    }

    /// Number of elements per (batch, channel) pair, i.e. voxels per volume.
    pub fn spatial_len(&self) -> usize {
        self.shape.iter().skip(2).product()
    }

    /// Spatial dimensions of a `[B, C, ...]` tensor.
    pub fn spatial_shape(&self) -> &[usize] {
        if self.shape.len() > 2 { &self.shape[2..] } else { &[] }
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Returns item `index` along the leading dimension, dropping that dimension.
    pub fn sample(&self, index: usize) -> Result<Tensor> {
        let n = self.batch_size();
        if index >= n {
            return Err(TrainError::model(format!(
                "sample index {index} out of range for batch of {n}"
            )));
        }
        let item_len = self.len() / n;
        let start = index * item_len;
        Tensor::from_data(self.shape[1..].to_vec(), self.data[start..start + item_len].to_vec())
    }

    /// Stacks same-shape tensors along a new leading dimension.
    pub fn stack(items: &[&Tensor]) -> Result<Tensor> {
        let first = items
            .first()
            .ok_or_else(|| TrainError::model("cannot stack an empty list of tensors"))?;
        let mut shape = Vec::with_capacity(first.shape.len() + 1);
        shape.push(items.len());
        shape.extend_from_slice(&first.shape);

        let mut data = Vec::with_capacity(first.len() * items.len());
        for item in items {
            if item.shape != first.shape {
                return Err(TrainError::shape_mismatch(&first.shape, &item.shape));
            }
            data.extend_from_slice(&item.data);
        }
        Tensor::from_data(shape, data)
    }

    /// Collapses the class dimension of `[B, C, ...]` logits into a
    /// `[B, ...]` tensor of winning class indices.
    pub fn argmax_channels(&self) -> Result<Tensor> {
        if self.shape.len() < 2 {
            return Err(TrainError::model(format!(
                "argmax over channels needs at least 2 dimensions, got {:?}",
                self.shape
            )));
        }
        let (batch, classes, spatial) = (self.batch_size(), self.channels(), self.spatial_len());
        let mut out = Vec::with_capacity(batch * spatial);
        for b in 0..batch {
            let base = b * classes * spatial;
            for v in 0..spatial {
                let mut best = 0;
                let mut best_val = f32::NEG_INFINITY;
                for c in 0..classes {
                    let x = self.data[base + c * spatial + v];
                    if x > best_val {
                        best_val = x;
                        best = c;
                    }
                }
                out.push(best as f32);
            }
        }
        let mut shape = vec![batch];
        shape.extend_from_slice(self.spatial_shape());
        Tensor::from_data(shape, out)
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}
