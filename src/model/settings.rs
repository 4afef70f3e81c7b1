use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, TrainError};

/// Architecture description for `VoxelNet`, read from the run's opaque
/// `model_settings` block.
///
/// Unknown keys are ignored so that settings written for other model
/// families (patch size, attention heads, ...) still parse.
/// `num_channels` is normally absent from the file and injected from the
/// first training sample before the model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelNetSettings {
    #[serde(default)]
    pub num_channels: Option<usize>,
    /// Widths of the hidden pointwise layers (input → output order).
    #[serde(default = "default_hidden_sizes")]
    pub hidden_sizes: Vec<usize>,
    pub output_classes: usize,
    #[serde(default)]
    pub activation: ActivationFunction,
}

fn default_hidden_sizes() -> Vec<usize> {
    vec![16, 16]
}

impl VoxelNetSettings {
    pub fn from_value(value: &serde_json::Value) -> Result<VoxelNetSettings> {
        let settings: VoxelNetSettings = serde_json::from_value(value.clone())
            .map_err(|e| TrainError::config(format!("model_settings: {e}")))?;
        if settings.output_classes < 2 {
            return Err(TrainError::config("model_settings.output_classes must be at least 2"));
        }
        if settings.hidden_sizes.contains(&0) {
            return Err(TrainError::config("model_settings.hidden_sizes must be non-zero"));
        }
        Ok(settings)
    }
}
