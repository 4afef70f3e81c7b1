use crate::model::param::Param;

/// Applies one parameter update from the (already unscaled) gradients.
///
/// Called once per accumulation window; the caller clears the gradients
/// afterwards.
pub trait Optimizer {
    fn step(&mut self, params: &mut [&mut Param]);

    fn learning_rate(&self) -> f32;
}
