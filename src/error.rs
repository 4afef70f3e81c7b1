use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Everything that can abort a training run.
///
/// Gradient overflow during mixed-precision training is deliberately absent:
/// it is a normal, locally recovered condition reported through
/// `StepOutcome::Overflow`, never through this type.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A checkpoint requested for restore does not exist on disk.
    #[error("checkpoint not found: {}", path.display())]
    CheckpointMissing { path: PathBuf },

    /// A required option is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Tensor shapes handed over by a collaborator do not line up.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// A collaborator (model, loss, loader) failed its contract.
    #[error("model error: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        TrainError::Config(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        TrainError::Model(msg.into())
    }

    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        TrainError::ShapeMismatch { expected: expected.to_vec(), got: got.to_vec() }
    }
}
