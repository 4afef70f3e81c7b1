use crate::error::{Result, TrainError};
use crate::math::tensor::Tensor;
use crate::model::param::Param;
use crate::model::state_dict::StateDict;

/// The differentiable segmentation model, as seen by the training loop.
///
/// The loop treats the architecture as a black box: it feeds `[B, C, ...]`
/// volumes through `forward`, hands the loss gradient with respect to the
/// logits back through `backward`, and lets the optimizer touch the
/// parameters between windows.
pub trait Model {
    /// Maps an input volume to per-voxel class logits `[B, classes, ...]`.
    fn forward(&mut self, input: &Tensor) -> Result<Tensor>;

    /// Back-propagates `d(loss)/d(logits)` from the most recent `forward`,
    /// adding into every parameter's gradient buffer.
    fn backward(&mut self, grad_logits: &Tensor) -> Result<()>;

    fn parameters(&self) -> Vec<&Param>;

    fn parameters_mut(&mut self) -> Vec<&mut Param>;

    /// Switches between training mode and inference mode.
    fn set_training(&mut self, training: bool);

    fn zero_grad(&mut self) {
        for param in self.parameters_mut() {
            param.zero_grad();
        }
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for param in self.parameters() {
            state.insert(param.name.clone(), param.value.clone());
        }
        state
    }

    /// Restores parameter values. Every parameter must be present with a
    /// matching shape; extra entries are rejected too.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let mut params = self.parameters_mut();
        if params.len() != state.len() {
            return Err(TrainError::model(format!(
                "state dict has {} entries, model has {} parameters",
                state.len(),
                params.len()
            )));
        }
        for param in params.iter_mut() {
            let value = state.get(&param.name).ok_or_else(|| {
                TrainError::model(format!("state dict is missing parameter '{}'", param.name))
            })?;
            if value.shape != param.value.shape {
                return Err(TrainError::shape_mismatch(&param.value.shape, &value.shape));
            }
            param.value = value.clone();
        }
        Ok(())
    }
}
