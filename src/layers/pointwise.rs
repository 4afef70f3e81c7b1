use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, TrainError};
use crate::math::tensor::Tensor;
use crate::model::param::Param;

/// A 1x1x1 convolution: the same dense layer applied to the channel vector
/// of every voxel, followed by an element-wise activation.
///
/// Weights have shape `[out, in]`, biases `[out]`.
#[derive(Debug)]
pub struct PointwiseLayer {
    pub weights: Param,
    pub biases: Param,
    pub activation: ActivationFunction,
    input: Option<Tensor>,
    pre_activation: Option<Tensor>, // z = Wx + b, needed for the derivative
}

impl PointwiseLayer {
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> PointwiseLayer {
        let weights = Tensor::normal_init(&[size, input_size], input_size, activation.init_gain(), rng);
        PointwiseLayer {
            weights: Param::new(format!("{name}.weight"), weights),
            biases: Param::new(format!("{name}.bias"), Tensor::zeros(&[size])),
            activation,
            input: None,
            pre_activation: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.value.shape[1]
    }

    pub fn size(&self) -> usize {
        self.weights.value.shape[0]
    }

    /// Forward pass. Caches the input and pre-activation when `keep_cache`
    /// is set so that `backward` can run afterwards.
    pub fn forward(&mut self, input: &Tensor, keep_cache: bool) -> Result<Tensor> {
        let (n_in, n_out) = (self.input_size(), self.size());
        if input.shape.len() < 2 || input.channels() != n_in {
            let mut expected = input.shape.clone();
            if expected.len() >= 2 {
                expected[1] = n_in;
            }
            return Err(TrainError::shape_mismatch(&expected, &input.shape));
        }
        let (batch, spatial) = (input.batch_size(), input.spatial_len());
        let w = &self.weights.value.data;
        let b = &self.biases.value.data;

        let mut out_shape = input.shape.clone();
        out_shape[1] = n_out;
        let mut z = Tensor::zeros(&out_shape);
        for bi in 0..batch {
            let x_base = bi * n_in * spatial;
            let z_base = bi * n_out * spatial;
            for o in 0..n_out {
                let z_row = &mut z.data[z_base + o * spatial..z_base + (o + 1) * spatial];
                z_row.iter_mut().for_each(|v| *v = b[o]);
                for i in 0..n_in {
                    let wi = w[o * n_in + i];
                    let x_row = &input.data[x_base + i * spatial..x_base + (i + 1) * spatial];
                    for (zv, xv) in z_row.iter_mut().zip(x_row) {
                        *zv += wi * xv;
                    }
                }
            }
        }

        let activation = self.activation;
        let a = z.map(|x| activation.function(x));
        if keep_cache {
            self.input = Some(input.clone());
            self.pre_activation = Some(z);
        } else {
            self.input = None;
            self.pre_activation = None;
        }
        Ok(a)
    }

    /// Accumulates weight and bias gradients and returns `d(loss)/d(input)`.
    /// `grad_output` is `d(loss)/d(a)` for this layer's output.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let (input, z) = match (&self.input, &self.pre_activation) {
            (Some(input), Some(z)) => (input, z),
            _ => return Err(TrainError::model("backward called without a cached training forward pass")),
        };
        if grad_output.shape != z.shape {
            return Err(TrainError::shape_mismatch(&z.shape, &grad_output.shape));
        }
        let (n_in, n_out) = (self.input_size(), self.size());
        let (batch, spatial) = (input.batch_size(), input.spatial_len());

        // δ = grad ⊙ σ'(z)
        let delta: Vec<f32> = grad_output.data.iter().zip(&z.data)
            .map(|(g, zv)| g * self.activation.derivative(*zv))
            .collect();

        let w = &self.weights.value.data;
        let mut grad_input = Tensor::zeros(&input.shape);
        for bi in 0..batch {
            let x_base = bi * n_in * spatial;
            let d_base = bi * n_out * spatial;
            for o in 0..n_out {
                let d_row = &delta[d_base + o * spatial..d_base + (o + 1) * spatial];
                self.biases.grad.data[o] += d_row.iter().sum::<f32>();
                for i in 0..n_in {
                    let x_row = &input.data[x_base + i * spatial..x_base + (i + 1) * spatial];
                    self.weights.grad.data[o * n_in + i] +=
                        d_row.iter().zip(x_row).map(|(d, x)| d * x).sum::<f32>();
                    let wi = w[o * n_in + i];
                    let gi_row = &mut grad_input.data[x_base + i * spatial..x_base + (i + 1) * spatial];
                    for (g, d) in gi_row.iter_mut().zip(d_row) {
                        *g += wi * d;
                    }
                }
            }
        }
        Ok(grad_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn layer() -> PointwiseLayer {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layer = PointwiseLayer::new("l0", 2, 3, ActivationFunction::Tanh, &mut rng);
        layer.biases.value = Tensor::from_data(vec![3], vec![0.1, -0.2, 0.05]).unwrap();
        layer
    }

    fn input() -> Tensor {
        // [B=2, C=2, S=2]
        Tensor::from_data(vec![2, 2, 2], vec![0.5, -1.0, 0.25, 0.8, -0.3, 0.9, 1.1, -0.6]).unwrap()
    }

    /// Loss used for the gradient check: sum of outputs.
    fn loss(layer: &mut PointwiseLayer) -> f32 {
        layer.forward(&input(), false).unwrap().sum()
    }

    #[test]
    fn forward_maps_channels_per_voxel() {
        let mut layer = layer();
        let out = layer.forward(&input(), false).unwrap();
        assert_eq!(out.shape, vec![2, 3, 2]);
    }

    #[test]
    fn forward_rejects_wrong_channel_count() {
        let mut layer = layer();
        let bad = Tensor::zeros(&[1, 4, 2]);
        assert!(matches!(layer.forward(&bad, true), Err(TrainError::ShapeMismatch { .. })));
    }

    #[test]
    fn backward_without_cache_fails() {
        let mut layer = layer();
        layer.forward(&input(), false).unwrap();
        assert!(layer.backward(&Tensor::filled(&[2, 3, 2], 1.0)).is_err());
    }

    #[test]
    fn weight_gradients_match_finite_differences() {
        let mut layer = layer();
        let out = layer.forward(&input(), true).unwrap();
        layer.backward(&Tensor::filled(&out.shape, 1.0)).unwrap();
        let analytic = layer.weights.grad.clone();

        let h = 1e-2;
        for k in 0..analytic.len() {
            let orig = layer.weights.value.data[k];
            layer.weights.value.data[k] = orig + h;
            let up = loss(&mut layer);
            layer.weights.value.data[k] = orig - h;
            let down = loss(&mut layer);
            layer.weights.value.data[k] = orig;
            let numeric = (up - down) / (2.0 * h);
            assert!((numeric - analytic.data[k]).abs() < 1e-2, "w[{k}]: {numeric} vs {}", analytic.data[k]);
        }
    }

    #[test]
    fn gradients_accumulate_across_backward_calls() {
        let mut layer = layer();
        let out = layer.forward(&input(), true).unwrap();
        let ones = Tensor::filled(&out.shape, 1.0);
        layer.backward(&ones).unwrap();
        let once = layer.biases.grad.clone();
        layer.backward(&ones).unwrap();
        for (twice, once) in layer.biases.grad.data.iter().zip(&once.data) {
            assert!((twice - 2.0 * once).abs() < 1e-5);
        }
    }
}
