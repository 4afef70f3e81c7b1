use std::time::Instant;
use tracing::{debug, info};

use crate::data::batch::Batch;
use crate::error::{Result, TrainError};
use crate::train::epoch_stats::EpochStats;
use crate::train::run::{BatchStep, EpochRecord, LoopState};
use crate::train::trainer::Trainer;

pub const TAG_BATCH_LOSS: &str = "Loss/train (iteration)";
pub const TAG_EPOCH_LOSS: &str = "Loss/train";
pub const TAG_OVERLAY: &str = "Original";

/// Outcome of `Trainer::run`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub epochs: Vec<EpochRecord>,
    pub best_loss: Option<f64>,
    pub stopped_early: bool,
    pub final_loss_scale: f32,
}

impl TrainReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|r| r.mean_loss)
    }
}

impl Trainer {
    /// Trains for `max_epochs` epochs, or until the stopping policy fires.
    ///
    /// Any error aborts the run; the last written `model_latest.pt` is then
    /// the recovery point.
    pub fn run(&mut self) -> Result<TrainReport> {
        let mut epochs = Vec::with_capacity(self.settings.max_epochs);
        let mut stopped_early = false;

        for epoch in 0..self.settings.max_epochs {
            let started = Instant::now();
            let record = self.run_epoch(epoch)?;
            let stop = self.complete_epoch(&record, started)?;
            epochs.push(record);
            if stop {
                stopped_early = true;
                break;
            }
        }

        self.run.transition(LoopState::Terminal)?;
        self.sink.flush()?;
        info!(epochs = epochs.len(), best_loss = ?self.run.best_loss, stopped_early, "training finished");
        Ok(TrainReport {
            epochs,
            best_loss: self.run.best_loss,
            stopped_early,
            final_loss_scale: self.precision.loss_scale(),
        })
    }

    /// Runs every batch of one epoch and folds them into an `EpochRecord`.
    pub fn run_epoch(&mut self, epoch: usize) -> Result<EpochRecord> {
        self.run.transition(LoopState::RunningEpoch)?;
        self.run.epoch = epoch;
        self.model.set_training(true);

        // Checked at construction; a loader may still shrink between epochs.
        let total = self.loader.num_batches();
        if total == 0 {
            return Err(TrainError::model("the training loader yields no batches"));
        }

        let mut steps = Vec::with_capacity(total);
        for (batch_index, batch) in self.loader.batches().enumerate() {
            let batch = batch?;
            self.run.transition(LoopState::RunningBatch)?;
            steps.push(self.run_batch(epoch, batch_index, total, batch)?);
        }
        if steps.len() != total {
            return Err(TrainError::model(format!(
                "loader announced {total} batches but yielded {}",
                steps.len()
            )));
        }
        Ok(EpochRecord::from_steps(epoch, &steps))
    }

    /// One mini-batch: forward and loss, scaled backward, conditional
    /// optimizer step, then logging.
    pub fn run_batch(
        &mut self,
        epoch: usize,
        batch_index: usize,
        total_batches: usize,
        batch: Batch,
    ) -> Result<BatchStep> {
        let batch = batch.to_device(self.precision.device())?;
        let pass = self.precision.compute(
            self.model.as_mut(),
            self.loss_fn.as_ref(),
            &batch.image,
            &batch.label,
        )?;
        let raw_loss = pass.loss.value;

        let divisor = self.scheduler.loss_divisor(batch_index, total_batches);
        let scaled_loss = self
            .precision
            .scale_and_backward(self.model.as_mut(), &pass.loss.scaled(1.0 / divisor))?;

        let due = self.scheduler.is_due(batch_index, total_batches);
        let outcome = self.precision.step_if_due(self.model.as_mut(), self.optimizer.as_mut(), due);

        let global_step = (epoch * total_batches + batch_index) as u64;
        self.sink.add_scalar(TAG_BATCH_LOSS, raw_loss as f64, global_step)?;
        if batch_index % self.settings.image_log_interval == 0 {
            let volume = batch.image.sample(0)?;
            let prediction = pass.logits.argmax_channels()?.sample(0)?;
            let images = self.visualizer.render(&volume, &prediction)?;
            self.sink.add_images(TAG_OVERLAY, &images, global_step)?;
        }
        self.run.global_step += 1;

        debug!(epoch, batch_index, loss = raw_loss, due, ?outcome, "batch done");
        Ok(BatchStep { batch_index, global_step, raw_loss, scaled_loss, due, outcome })
    }

    /// Logs the epoch mean, writes checkpoints, runs the optional evaluation
    /// and reports progress. Returns whether the stopping policy fired.
    fn complete_epoch(&mut self, record: &EpochRecord, started: Instant) -> Result<bool> {
        self.run.transition(LoopState::EpochComplete)?;
        self.run.record_epoch(record);
        self.sink.add_scalar(TAG_EPOCH_LOSS, record.mean_loss, record.epoch as u64)?;

        let state = self.model.state_dict();
        self.checkpoints.save_latest(&state)?;
        let new_best = self
            .checkpoints
            .maybe_save_best(&state, record.mean_loss, record.epoch, &mut self.run.best_loss)?
            .is_some();

        let evaluation = self.evaluation.evaluate(
            self.model.as_mut(),
            self.loss_fn.as_ref(),
            &self.precision,
            record.epoch,
            self.sink.as_mut(),
        )?;
        self.sink.flush()?;

        info!(
            epoch = record.epoch,
            loss = record.mean_loss,
            steps = record.optimizer_steps,
            skipped = record.skipped_steps,
            loss_scale = self.precision.loss_scale(),
            "epoch complete"
        );

        let stats = EpochStats {
            epoch: record.epoch,
            total_epochs: self.settings.max_epochs,
            train_loss: record.mean_loss,
            val_loss: evaluation.map(|e| e.loss),
            val_accuracy: evaluation.map(|e| e.accuracy),
            optimizer_steps: record.optimizer_steps,
            skipped_steps: record.skipped_steps,
            loss_scale: self.precision.loss_scale(),
            new_best,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if let Some(tx) = &self.progress_tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(stats);
        }

        Ok(self.stopping.should_stop(&self.run.loss_history))
    }
}

