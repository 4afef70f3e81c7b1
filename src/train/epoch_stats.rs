use serde::{Serialize, Deserialize};

/// Per-epoch training statistics.
///
/// When a progress channel is attached with `Trainer::with_progress`, the
/// loop sends one `EpochStats` value at the end of every completed epoch.
/// Receivers (a terminal progress line, a dashboard) use it to follow the
/// run without touching the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 0-based epoch index, matching the checkpoint and log step numbering.
    pub epoch: usize,
    /// Epoch budget for this run.
    pub total_epochs: usize,
    /// Mean raw training loss over the epoch's batches.
    pub train_loss: f64,
    /// Held-out loss, if evaluation is enabled.
    pub val_loss: Option<f64>,
    /// Held-out voxel accuracy in [0, 1], if evaluation is enabled.
    pub val_accuracy: Option<f64>,
    pub optimizer_steps: usize,
    /// Due steps skipped because of non-finite gradients.
    pub skipped_steps: usize,
    /// Loss scale in effect at the end of the epoch.
    pub loss_scale: f32,
    /// Whether this epoch produced a new best checkpoint.
    pub new_best: bool,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
