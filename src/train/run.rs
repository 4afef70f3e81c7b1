use std::fmt;
use tracing::debug;

use crate::error::{Result, TrainError};
use crate::precision::device::Device;
use crate::precision::manager::StepOutcome;
use crate::precision::precision::Precision;

/// Phases of the epoch/batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Initializing,
    RunningEpoch,
    RunningBatch,
    EpochComplete,
    Terminal,
}

impl LoopState {
    /// Whether the loop may move from `self` to `next`.
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, RunningEpoch)
                | (RunningEpoch, RunningBatch)
                | (RunningBatch, RunningBatch)
                | (RunningBatch, EpochComplete)
                | (EpochComplete, RunningEpoch)
                | (EpochComplete, Terminal)
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One processed mini-batch. Tensors are not kept; only what the loop
/// logs and aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStep {
    pub batch_index: usize,
    pub global_step: u64,
    /// Loss before the accumulation divisor and the loss scale.
    pub raw_loss: f32,
    /// Loss after division and scaling, as it entered backward.
    pub scaled_loss: f32,
    pub due: bool,
    pub outcome: StepOutcome,
}

/// Summary of a finished epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Arithmetic mean of the epoch's raw batch losses.
    pub mean_loss: f64,
    pub batches: usize,
    pub optimizer_steps: usize,
    pub skipped_steps: usize,
    /// Batch indices at which a window closed.
    pub update_indices: Vec<usize>,
}

impl EpochRecord {
    /// Folds the epoch's batch steps into a record.
    pub fn from_steps(epoch: usize, steps: &[BatchStep]) -> EpochRecord {
        let total: f64 = steps.iter().map(|s| s.raw_loss as f64).sum();
        let mean_loss = if steps.is_empty() { f64::NAN } else { total / steps.len() as f64 };
        EpochRecord {
            epoch,
            mean_loss,
            batches: steps.len(),
            optimizer_steps: steps.iter().filter(|s| s.outcome == StepOutcome::Applied).count(),
            skipped_steps: steps.iter().filter(|s| s.outcome == StepOutcome::Overflow).count(),
            update_indices: steps.iter().filter(|s| s.due).map(|s| s.batch_index).collect(),
        }
    }
}

/// State of one training invocation. Only checkpoints and logs outlive it.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub epoch: usize,
    pub loss_history: Vec<f64>,
    pub best_loss: Option<f64>,
    pub device: Device,
    pub precision: Precision,
    /// Batches processed so far across all epochs.
    pub global_step: u64,
    state: LoopState,
}

impl TrainingRun {
    pub fn new(device: Device, precision: Precision) -> TrainingRun {
        TrainingRun {
            epoch: 0,
            loss_history: Vec::new(),
            best_loss: None,
            device,
            precision,
            global_step: 0,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn transition(&mut self, next: LoopState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(TrainError::model(format!(
                "illegal training loop transition {} -> {next}",
                self.state
            )));
        }
        debug!(from = %self.state, to = %next, epoch = self.epoch, "loop state");
        self.state = next;
        Ok(())
    }

    pub fn record_epoch(&mut self, record: &EpochRecord) {
        self.loss_history.push(record.mean_loss);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(i: usize, loss: f32, due: bool) -> BatchStep {
        BatchStep {
            batch_index: i,
            global_step: i as u64,
            raw_loss: loss,
            scaled_loss: loss,
            due,
            outcome: if due { StepOutcome::Applied } else { StepOutcome::Accumulating },
        }
    }

    #[test]
    fn record_means_raw_losses() {
        let steps = [step(0, 1.0, true), step(1, 0.8, true), step(2, 0.9, true), step(3, 0.6, true)];
        let record = EpochRecord::from_steps(0, &steps);
        assert!((record.mean_loss - 0.825).abs() < 1e-6);
        assert_eq!(record.optimizer_steps, 4);
        assert_eq!(record.update_indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn transitions_follow_the_loop() {
        let mut run = TrainingRun::new(Device::Cpu, Precision::Fp32);
        for next in [
            LoopState::Initializing,
            LoopState::RunningEpoch,
            LoopState::RunningBatch,
            LoopState::RunningBatch,
            LoopState::EpochComplete,
            LoopState::RunningEpoch,
            LoopState::RunningBatch,
            LoopState::EpochComplete,
            LoopState::Terminal,
        ] {
            run.transition(next).unwrap();
        }
        assert!(run.transition(LoopState::RunningEpoch).is_err());
    }

    #[test]
    fn epoch_cannot_complete_without_batches() {
        let mut run = TrainingRun::new(Device::Cpu, Precision::Fp32);
        run.transition(LoopState::Initializing).unwrap();
        run.transition(LoopState::RunningEpoch).unwrap();
        assert!(run.transition(LoopState::EpochComplete).is_err());
    }
}
