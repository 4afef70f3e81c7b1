use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, TrainError};
use crate::math::tensor::Tensor;
use crate::model::state_dict::StateDict;

const FORMAT_VERSION: u32 = 2;

/// On-disk layout of a checkpoint. Values are stored as their f32 bit
/// patterns, so every value, non-finite ones included, loads back exactly.
#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    format_version: u32,
    parameters: BTreeMap<String, StoredTensor>,
}

#[derive(Serialize, Deserialize)]
struct StoredTensor {
    shape: Vec<usize>,
    bits: Vec<u32>,
}

/// Persists model parameters as a rolling "latest" slot plus one
/// never-overwritten "best" file per improving epoch.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointManager { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join("model_latest.pt")
    }

    pub fn best_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("model_best({epoch}).pt"))
    }

    /// Overwrites the latest checkpoint. Equal states produce identical bytes.
    pub fn save_latest(&self, state: &StateDict) -> Result<PathBuf> {
        let path = self.latest_path();
        self.write(&path, state)?;
        info!(path = %path.display(), "saved latest checkpoint");
        Ok(path)
    }

    /// Writes `model_best(<epoch>).pt` when `epoch_loss` is strictly below
    /// `best_loss`, then records the new best.
    ///
    /// With no prior best, the first finite loss becomes the baseline and is
    /// written. A non-finite loss never counts as an improvement.
    pub fn maybe_save_best(
        &self,
        state: &StateDict,
        epoch_loss: f64,
        epoch: usize,
        best_loss: &mut Option<f64>,
    ) -> Result<Option<PathBuf>> {
        if !epoch_loss.is_finite() {
            return Ok(None);
        }
        let improved = match *best_loss {
            None => true,
            Some(best) => epoch_loss < best,
        };
        if !improved {
            return Ok(None);
        }
        let path = self.best_path(epoch);
        self.write(&path, state)?;
        *best_loss = Some(epoch_loss);
        info!(path = %path.display(), loss = epoch_loss, "saved best checkpoint");
        Ok(Some(path))
    }

    /// Restores a checkpoint previously written by this manager.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<StateDict> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TrainError::CheckpointMissing { path: path.to_path_buf() });
        }
        let file: CheckpointFile = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if file.format_version != FORMAT_VERSION {
            return Err(TrainError::model(format!(
                "checkpoint {} has format version {}, expected {FORMAT_VERSION}",
                path.display(),
                file.format_version
            )));
        }
        let mut state = StateDict::new();
        for (name, stored) in file.parameters {
            let data = stored.bits.into_iter().map(f32::from_bits).collect();
            state.insert(name, Tensor::from_data(stored.shape, data)?);
        }
        Ok(state)
    }

    fn write(&self, path: &Path, state: &StateDict) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let file = CheckpointFile {
            format_version: FORMAT_VERSION,
            parameters: state
                .entries
                .iter()
                .map(|(name, t)| {
                    let stored = StoredTensor {
                        shape: t.shape.clone(),
                        bits: t.data.iter().map(|x| x.to_bits()).collect(),
                    };
                    (name.clone(), stored)
                })
                .collect(),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &file)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state(values: &[f32]) -> StateDict {
        let mut s = StateDict::new();
        s.insert("layers.0.weight", Tensor::from_data(vec![values.len()], values.to_vec()).unwrap());
        s.insert("layers.0.bias", Tensor::filled(&[1], 0.125));
        s
    }

    #[test]
    fn paths_follow_saved_models_layout() {
        let ckpt = CheckpointManager::new("models/saved_models");
        assert_eq!(ckpt.latest_path(), PathBuf::from("models/saved_models/model_latest.pt"));
        assert_eq!(ckpt.best_path(4), PathBuf::from("models/saved_models/model_best(4).pt"));
    }

    #[test]
    fn save_latest_creates_directory_and_is_byte_identical() {
        let dir = tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("nested/models"));
        let s = state(&[0.1, -2.5e-7, 3.0]);
        let path = ckpt.save_latest(&s).unwrap();
        let first = fs::read(&path).unwrap();
        ckpt.save_latest(&s).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn load_reproduces_exact_values() {
        let dir = tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        let s = state(&[0.1, 1.0 / 3.0, f32::MIN_POSITIVE, -123456.79, 7.006e-39]);
        let path = ckpt.save_latest(&s).unwrap();
        assert_eq!(ckpt.load(path).unwrap(), s);
    }

    #[test]
    fn load_reproduces_non_finite_values_bit_for_bit() {
        let dir = tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        let s = state(&[f32::INFINITY, 1.0, f32::NEG_INFINITY, f32::NAN, -0.0]);
        let path = ckpt.save_latest(&s).unwrap();

        let loaded = ckpt.load(path).unwrap();
        let bits = |d: &StateDict| -> Vec<(String, Vec<usize>, Vec<u32>)> {
            d.entries
                .iter()
                .map(|(name, t)| (name.clone(), t.shape.clone(), t.data.iter().map(|x| x.to_bits()).collect()))
                .collect()
        };
        assert_eq!(bits(&loaded), bits(&s));
    }

    #[test]
    fn best_only_on_strict_improvement() {
        let dir = tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        let s = state(&[1.0]);
        let mut best = None;

        assert_eq!(ckpt.maybe_save_best(&s, 0.5, 0, &mut best).unwrap(), Some(ckpt.best_path(0)));
        assert_eq!(best, Some(0.5));
        assert_eq!(ckpt.maybe_save_best(&s, 0.7, 1, &mut best).unwrap(), None);
        assert_eq!(ckpt.maybe_save_best(&s, 0.5, 2, &mut best).unwrap(), None);
        assert_eq!(ckpt.maybe_save_best(&s, f64::NAN, 3, &mut best).unwrap(), None);
        assert_eq!(ckpt.maybe_save_best(&s, 0.4, 4, &mut best).unwrap(), Some(ckpt.best_path(4)));
        assert_eq!(best, Some(0.4));

        assert!(ckpt.best_path(0).exists());
        assert!(!ckpt.best_path(1).exists());
        assert!(!ckpt.best_path(2).exists());
        assert!(ckpt.best_path(4).exists());
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let dir = tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        match ckpt.load(ckpt.latest_path()) {
            Err(TrainError::CheckpointMissing { path }) => assert_eq!(path, ckpt.latest_path()),
            other => panic!("expected CheckpointMissing, got {other:?}"),
        }
    }
}
