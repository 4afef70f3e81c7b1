use crate::model::param::Param;
use crate::optim::optimizer::Optimizer;

/// Adam with L2 weight decay folded into the gradient.
///
/// Moment buffers are created lazily on the first step and indexed by
/// parameter position, so the parameter list must keep a stable order.
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub weight_decay: f32,
    t: u32,
    moments: Vec<(Vec<f32>, Vec<f32>)>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            t: 0,
            moments: Vec::new(),
        }
    }

    /// Defaults for small-batch volumetric training: a higher first-moment
    /// beta smooths the noisy gradients of batch sizes around 2.
    pub fn for_segmentation(learning_rate: f32) -> Adam {
        Adam::new(learning_rate).with_betas(0.99, 0.999).with_weight_decay(1e-5)
    }

    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Adam {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Adam {
        self.weight_decay = weight_decay;
        self
    }

    pub fn steps_taken(&self) -> u32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Param]) {
        if self.moments.len() != params.len() {
            self.moments = params.iter()
                .map(|p| (vec![0.0; p.value.len()], vec![0.0; p.value.len()]))
                .collect();
        }
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);

        for (param, (m, v)) in params.iter_mut().zip(self.moments.iter_mut()) {
            let Param { value, grad, .. } = &mut **param;
            for k in 0..value.data.len() {
                let g = grad.data[k] + self.weight_decay * value.data[k];
                m[k] = self.beta1 * m[k] + (1.0 - self.beta1) * g;
                v[k] = self.beta2 * v[k] + (1.0 - self.beta2) * g * g;
                let m_hat = m[k] / bias1;
                let v_hat = v[k] / bias2;
                value.data[k] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;

    #[test]
    fn first_step_moves_each_weight_by_learning_rate() {
        // With bias correction, |Δw| ≈ lr on the first step regardless of |g|.
        let mut p = Param::new("w", Tensor::from_data(vec![3], vec![0.0, 1.0, -1.0]).unwrap());
        p.grad = Tensor::from_data(vec![3], vec![10.0, -0.01, 0.5]).unwrap();
        let mut adam = Adam::new(0.01);
        adam.step(&mut [&mut p]);
        assert!((p.value.data[0] + 0.01).abs() < 1e-5);
        assert!((p.value.data[1] - 1.01).abs() < 1e-5);
        assert!((p.value.data[2] + 1.01).abs() < 1e-5);
        assert_eq!(adam.steps_taken(), 1);
    }

    #[test]
    fn minimizes_a_quadratic() {
        let mut p = Param::new("w", Tensor::from_data(vec![1], vec![3.0]).unwrap());
        let mut adam = Adam::for_segmentation(0.1);
        for _ in 0..500 {
            p.grad.data[0] = 2.0 * p.value.data[0];
            adam.step(&mut [&mut p]);
        }
        assert!(p.value.data[0].abs() < 0.1, "got {}", p.value.data[0]);
    }
}
