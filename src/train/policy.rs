use tracing::{info, warn};

use crate::data::loader::BatchLoader;
use crate::error::Result;
use crate::loss::loss_function::LossFunction;
use crate::logging::sink::MetricSink;
use crate::model::model::Model;
use crate::precision::manager::PrecisionManager;

/// Decides after each epoch whether training should end early.
pub trait StoppingPolicy {
    /// `history` holds every epoch mean loss so far, newest last.
    fn should_stop(&mut self, history: &[f64]) -> bool;
}

/// Trains for the full epoch budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl StoppingPolicy for NeverStop {
    fn should_stop(&mut self, _history: &[f64]) -> bool {
        false
    }
}

/// Stops once the newest loss is worse than every loss in the preceding
/// `window - 1` epochs.
#[derive(Debug, Clone, Copy)]
pub struct PlateauStopping {
    pub window: usize,
}

impl StoppingPolicy for PlateauStopping {
    fn should_stop(&mut self, history: &[f64]) -> bool {
        let n = history.len();
        if n <= self.window || self.window < 2 {
            return false;
        }
        let latest = history[n - 1];
        let previous_max = history[n - self.window..n - 1].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let stop = previous_max < latest;
        if stop {
            warn!(window = self.window, latest, previous_max, "loss plateaued, stopping early");
        }
        stop
    }
}

/// Held-out metrics for one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    /// Fraction of voxels whose predicted class matches the label.
    pub accuracy: f64,
}

/// Optional per-epoch evaluation step.
pub trait EvaluationPolicy {
    fn evaluate(
        &mut self,
        model: &mut dyn Model,
        loss_fn: &dyn LossFunction,
        precision: &PrecisionManager,
        epoch: usize,
        sink: &mut dyn MetricSink,
    ) -> Result<Option<Evaluation>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvaluation;

impl EvaluationPolicy for NoEvaluation {
    fn evaluate(
        &mut self,
        _model: &mut dyn Model,
        _loss_fn: &dyn LossFunction,
        _precision: &PrecisionManager,
        _epoch: usize,
        _sink: &mut dyn MetricSink,
    ) -> Result<Option<Evaluation>> {
        Ok(None)
    }
}

/// Runs the model in inference mode over a held-out loader and logs
/// `Loss/test` and `ACC/test` at step `epoch`.
pub struct HoldoutEvaluation {
    loader: Box<dyn BatchLoader>,
}

impl HoldoutEvaluation {
    pub fn new(loader: Box<dyn BatchLoader>) -> Self {
        HoldoutEvaluation { loader }
    }
}

impl EvaluationPolicy for HoldoutEvaluation {
    fn evaluate(
        &mut self,
        model: &mut dyn Model,
        loss_fn: &dyn LossFunction,
        precision: &PrecisionManager,
        epoch: usize,
        sink: &mut dyn MetricSink,
    ) -> Result<Option<Evaluation>> {
        if self.loader.num_batches() == 0 {
            return Ok(None);
        }
        model.set_training(false);
        let mut losses = Vec::new();
        let (mut correct, mut voxels) = (0usize, 0usize);
        for batch in self.loader.batches() {
            let batch = batch?.to_device(precision.device())?;
            let pass = precision.compute(model, loss_fn, &batch.image, &batch.label)?;
            losses.push(pass.loss.value as f64);
            let predicted = pass.logits.argmax_channels()?;
            correct += predicted.data.iter().zip(&batch.label.data).filter(|(p, l)| p == l).count();
            voxels += predicted.len();
        }
        model.set_training(true);

        let evaluation = Evaluation {
            loss: losses.iter().sum::<f64>() / losses.len() as f64,
            accuracy: if voxels == 0 { 0.0 } else { correct as f64 / voxels as f64 },
        };
        sink.add_scalar("Loss/test", evaluation.loss, epoch as u64)?;
        sink.add_scalar("ACC/test", evaluation.accuracy, epoch as u64)?;
        info!(epoch, loss = evaluation.loss, accuracy = evaluation.accuracy, "held-out evaluation");
        Ok(Some(evaluation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plateau_needs_more_than_window_epochs() {
        let mut policy = PlateauStopping { window: 3 };
        assert!(!policy.should_stop(&[0.1, 0.2, 0.9]));
        assert!(policy.should_stop(&[1.0, 0.5, 0.4, 0.6]));
        assert!(!policy.should_stop(&[1.0, 0.5, 0.7, 0.6]));
    }

    #[test]
    fn plateau_with_trivial_window_never_stops() {
        let mut policy = PlateauStopping { window: 1 };
        assert!(!policy.should_stop(&[0.1, 0.2, 0.3]));
    }

    #[test]
    fn never_stop_ignores_history() {
        assert!(!NeverStop.should_stop(&[0.1, 5.0, 9.0]));
    }
}
