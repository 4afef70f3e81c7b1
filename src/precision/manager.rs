use tracing::warn;

use crate::error::Result;
use crate::loss::loss_function::{LossFunction, LossOutput};
use crate::math::tensor::Tensor;
use crate::model::model::Model;
use crate::optim::optimizer::Optimizer;
use crate::precision::device::Device;
use crate::precision::precision::Precision;
use crate::precision::scaler::{GradScaler, ScalerConfig};

/// Logits and loss produced inside the precision scope.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub logits: Tensor,
    pub loss: LossOutput,
}

/// What `step_if_due` did with the accumulated gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not at a window boundary; gradients keep accumulating.
    Accumulating,
    /// Gradients were finite and the optimizer update was applied.
    Applied,
    /// Non-finite gradients: update skipped, loss scale reduced.
    Overflow,
}

/// Owns the device, the numeric precision, and the loss-scale state.
#[derive(Debug, Clone)]
pub struct PrecisionManager {
    device: Device,
    precision: Precision,
    scaler: GradScaler,
}

impl PrecisionManager {
    pub fn new(device: Device, mixed_precision: bool) -> Self {
        let precision = Precision::for_run(mixed_precision);
        let scaler = if precision.is_reduced() {
            GradScaler::new(ScalerConfig::default())
        } else {
            GradScaler::disabled()
        };
        PrecisionManager { device, precision, scaler }
    }

    pub fn with_scaler(device: Device, precision: Precision, scaler: GradScaler) -> Self {
        PrecisionManager { device, precision, scaler }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn loss_scale(&self) -> f32 {
        self.scaler.scale()
    }

    pub fn scaler(&self) -> &GradScaler {
        &self.scaler
    }

    /// Forward pass and loss inside the reduced-precision scope.
    pub fn compute(
        &self,
        model: &mut dyn Model,
        loss_fn: &dyn LossFunction,
        input: &Tensor,
        target: &Tensor,
    ) -> Result<ForwardPass> {
        let input = self.precision.round_tensor(input);
        let logits = self.precision.round_tensor(&model.forward(&input)?);
        let loss = loss_fn.compute(&logits, target)?;
        Ok(ForwardPass { logits, loss })
    }

    /// Multiplies the loss by the current scale and back-propagates it,
    /// adding into the model's f32 gradient buffers. Returns the scaled
    /// loss value.
    ///
    /// The scaled backward signal is rounded through the reduced format,
    /// so an excessive scale surfaces as non-finite gradients at the next
    /// due step.
    pub fn scale_and_backward(&self, model: &mut dyn Model, loss: &LossOutput) -> Result<f32> {
        let scale = self.scaler.scale();
        let precision = self.precision;
        let grad = loss.grad.map(|g| precision.round(g * scale));
        model.backward(&grad)?;
        Ok(loss.value * scale)
    }

    /// At a window boundary: unscale, check for overflow, apply or skip the
    /// update, adjust the scale, and clear the gradient buffers.
    pub fn step_if_due(
        &mut self,
        model: &mut dyn Model,
        optimizer: &mut dyn Optimizer,
        due: bool,
    ) -> StepOutcome {
        if !due {
            return StepOutcome::Accumulating;
        }
        let mut params = model.parameters_mut();
        let finite = self.scaler.unscale_and_check(&mut params);
        if finite {
            optimizer.step(&mut params);
        } else {
            warn!(scale = self.scaler.scale(), "non-finite gradients, skipping optimizer step");
        }
        drop(params);
        self.scaler.update(!finite);
        model.zero_grad();

        if finite { StepOutcome::Applied } else { StepOutcome::Overflow }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::param::Param;
    use crate::optim::sgd::Sgd;

    /// One-parameter model whose gradient is the sum of the incoming signal.
    struct Probe {
        w: Param,
    }

    impl Model for Probe {
        fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
            Ok(input.map(|x| x * self.w.value.data[0]))
        }
        fn backward(&mut self, grad_logits: &Tensor) -> Result<()> {
            self.w.grad.data[0] += grad_logits.sum();
            Ok(())
        }
        fn parameters(&self) -> Vec<&Param> {
            vec![&self.w]
        }
        fn parameters_mut(&mut self) -> Vec<&mut Param> {
            vec![&mut self.w]
        }
        fn set_training(&mut self, _training: bool) {}
    }

    fn probe() -> Probe {
        Probe { w: Param::new("w", Tensor::filled(&[1], 1.0)) }
    }

    fn loss_with_grad(g: f32) -> LossOutput {
        LossOutput { value: 0.5, grad: Tensor::filled(&[1], g) }
    }

    fn manager(init_scale: f32) -> PrecisionManager {
        let scaler = GradScaler::new(ScalerConfig { init_scale, ..ScalerConfig::default() });
        PrecisionManager::with_scaler(Device::Cpu, Precision::Fp16, scaler)
    }

    #[test]
    fn backward_accumulates_scaled_gradients() {
        let pm = manager(8.0);
        let mut model = probe();
        let scaled = pm.scale_and_backward(&mut model, &loss_with_grad(0.25)).unwrap();
        assert_eq!(scaled, 4.0);
        pm.scale_and_backward(&mut model, &loss_with_grad(0.25)).unwrap();
        assert_eq!(model.w.grad.data[0], 4.0);
    }

    #[test]
    fn not_due_keeps_gradients() {
        let mut pm = manager(8.0);
        let mut model = probe();
        let mut sgd = Sgd::new(0.1);
        pm.scale_and_backward(&mut model, &loss_with_grad(1.0)).unwrap();
        assert_eq!(pm.step_if_due(&mut model, &mut sgd, false), StepOutcome::Accumulating);
        assert_eq!(model.w.grad.data[0], 8.0);
        assert_eq!(model.w.value.data[0], 1.0);
    }

    #[test]
    fn due_step_unscales_applies_and_clears() {
        let mut pm = manager(8.0);
        let mut model = probe();
        let mut sgd = Sgd::new(0.1);
        pm.scale_and_backward(&mut model, &loss_with_grad(1.0)).unwrap();
        assert_eq!(pm.step_if_due(&mut model, &mut sgd, true), StepOutcome::Applied);
        // Unscaled gradient is 1.0, so w = 1.0 - 0.1.
        assert!((model.w.value.data[0] - 0.9).abs() < 1e-6);
        assert_eq!(model.w.grad.data[0], 0.0);
        assert_eq!(pm.loss_scale(), 8.0);
    }

    #[test]
    fn overflow_skips_update_and_backs_off() {
        let mut pm = manager(65536.0);
        let mut model = probe();
        let mut sgd = Sgd::new(0.1);
        // 2.0 * 65536 exceeds the f16 range and rounds to inf.
        pm.scale_and_backward(&mut model, &loss_with_grad(2.0)).unwrap();
        assert_eq!(pm.step_if_due(&mut model, &mut sgd, true), StepOutcome::Overflow);
        assert_eq!(model.w.value.data[0], 1.0);
        assert_eq!(model.w.grad.data[0], 0.0);
        assert_eq!(pm.loss_scale(), 32768.0);
        assert_eq!(pm.scaler().overflow_count(), 1);

        // The reduced scale now fits in f16 and the step goes through.
        pm.scale_and_backward(&mut model, &loss_with_grad(1.0)).unwrap();
        assert_eq!(pm.step_if_due(&mut model, &mut sgd, true), StepOutcome::Applied);
    }

    #[test]
    fn full_precision_never_scales() {
        let pm = PrecisionManager::new(Device::Cpu, false);
        assert_eq!(pm.precision(), Precision::Fp32);
        assert_eq!(pm.loss_scale(), 1.0);
        let mut model = probe();
        let pass = pm.compute(&mut model, &crate::loss::CrossEntropyLoss, &Tensor::zeros(&[1, 2, 1]),
            &Tensor::zeros(&[1, 1, 1])).unwrap();
        assert!((pass.loss.value - 2.0f32.ln()).abs() < 1e-6);
    }
}
