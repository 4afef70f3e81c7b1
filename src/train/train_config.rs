use serde::{Serialize, Deserialize};
use serde_json::json;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::data::synthetic::SyntheticVolumes;
use crate::error::{Result, TrainError};
use crate::loss::loss_type::LossType;
use crate::optim::optimizer_type::OptimizerType;
use crate::precision::device::{Device, DeviceRequest};

/// Settings for one training run.
///
/// Every field has a default, so a settings file only needs the keys it
/// changes. `model_settings` is handed untouched to the model builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSettings {
    pub batch_size: usize,
    pub learning_rate: f32,
    pub max_epochs: usize,
    /// Mini-batches per optimizer update.
    pub batch_accumulation_iter: usize,
    /// Resume from `<checkpoint_dir>/model_latest.pt` before training.
    pub continue_training: bool,
    pub model_settings: serde_json::Value,
    /// Plateau window for early stopping; `None` disables it.
    pub early_stopping_epochs: Option<usize>,
    /// Evaluate on the held-out split after every epoch.
    pub evaluate: bool,
    pub mixed_precision: bool,
    pub device: DeviceRequest,
    /// Log an overlay image every this many batches.
    pub image_log_interval: usize,
    pub checkpoint_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Fraction of the dataset used for training; the rest is held out.
    pub train_split: f64,
    pub loss: LossType,
    pub optimizer: OptimizerType,
    /// Divide the last, shorter window of an epoch by its real length
    /// instead of `batch_accumulation_iter`.
    pub renormalize_partial_window: bool,
    pub seed: Option<u64>,
    pub dataset: SyntheticVolumes,
}

impl Default for TrainSettings {
    fn default() -> Self {
        TrainSettings {
            batch_size: 2,
            learning_rate: 1e-4,
            max_epochs: 100,
            batch_accumulation_iter: 1,
            continue_training: false,
            model_settings: json!({
                "hidden_sizes": [16, 16],
                "output_classes": 5,
                "activation": "relu",
            }),
            early_stopping_epochs: None,
            evaluate: false,
            mixed_precision: true,
            device: DeviceRequest::Auto,
            image_log_interval: 10,
            checkpoint_dir: PathBuf::from("models/saved_models"),
            log_dir: PathBuf::from("runs"),
            train_split: 0.8,
            loss: LossType::DiceCe,
            optimizer: OptimizerType::Adam,
            renormalize_partial_window: false,
            seed: None,
            dataset: SyntheticVolumes::default(),
        }
    }
}

impl TrainSettings {
    /// Checks every option the run depends on. Returns the first problem
    /// found as a `TrainError::Config`.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.max_epochs == 0 {
            return Err(TrainError::config("max_epochs must be at least 1"));
        }
        if self.batch_accumulation_iter == 0 {
            return Err(TrainError::config("batch_accumulation_iter must be at least 1"));
        }
        if self.image_log_interval == 0 {
            return Err(TrainError::config("image_log_interval must be at least 1"));
        }
        if !(self.train_split > 0.0 && self.train_split <= 1.0) {
            return Err(TrainError::config(format!(
                "train_split must lie in (0, 1], got {}",
                self.train_split
            )));
        }
        if self.early_stopping_epochs == Some(0) {
            return Err(TrainError::config("early_stopping_epochs must be at least 1 when set"));
        }
        if !self.model_settings.is_object() {
            return Err(TrainError::config("model_settings must be a JSON object"));
        }
        Device::resolve(self.device)?;
        Ok(())
    }

    /// Serializes the settings to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads settings from a JSON file; missing keys take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<TrainSettings> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            TrainError::config(format!("cannot open settings file {}: {e}", path.display()))
        })?;
        let settings = serde_json::from_reader(BufReader::new(file))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_run() {
        let s = TrainSettings::default();
        assert_eq!(s.batch_size, 2);
        assert_eq!(s.learning_rate, 1e-4);
        assert_eq!(s.max_epochs, 100);
        assert_eq!(s.batch_accumulation_iter, 1);
        assert!(!s.continue_training);
        assert!(s.mixed_precision);
        assert_eq!(s.image_log_interval, 10);
        assert_eq!(s.checkpoint_dir, PathBuf::from("models/saved_models"));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let s: TrainSettings = serde_json::from_str(
            r#"{ "batch_size": 4, "batch_accumulation_iter": 3, "device": "cpu", "loss": "cross_entropy" }"#,
        )
        .unwrap();
        assert_eq!(s.batch_size, 4);
        assert_eq!(s.batch_accumulation_iter, 3);
        assert_eq!(s.device, DeviceRequest::Cpu);
        assert_eq!(s.loss, LossType::CrossEntropy);
        assert_eq!(s.max_epochs, 100);
    }

    #[test]
    fn validate_rejects_out_of_range_options() {
        let bad = [
            TrainSettings { batch_size: 0, ..TrainSettings::default() },
            TrainSettings { learning_rate: 0.0, ..TrainSettings::default() },
            TrainSettings { learning_rate: f32::NAN, ..TrainSettings::default() },
            TrainSettings { max_epochs: 0, ..TrainSettings::default() },
            TrainSettings { batch_accumulation_iter: 0, ..TrainSettings::default() },
            TrainSettings { image_log_interval: 0, ..TrainSettings::default() },
            TrainSettings { train_split: 1.5, ..TrainSettings::default() },
            TrainSettings { early_stopping_epochs: Some(0), ..TrainSettings::default() },
            TrainSettings { device: DeviceRequest::Gpu, ..TrainSettings::default() },
            TrainSettings { model_settings: json!(3), ..TrainSettings::default() },
        ];
        for settings in bad {
            assert!(matches!(settings.validate(), Err(TrainError::Config(_))), "{settings:?}");
        }
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = TrainSettings { max_epochs: 7, seed: Some(3), ..TrainSettings::default() };
        settings.save_json(&path).unwrap();
        assert_eq!(TrainSettings::load_json(&path).unwrap(), settings);
        assert!(matches!(
            TrainSettings::load_json(dir.path().join("absent.json")),
            Err(TrainError::Config(_))
        ));
    }
}
