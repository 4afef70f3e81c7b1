use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, TrainError};
use crate::layers::pointwise::PointwiseLayer;
use crate::math::tensor::Tensor;
use crate::model::model::Model;
use crate::model::param::Param;
use crate::model::settings::VoxelNetSettings;

/// Stack of pointwise layers producing per-voxel class logits.
///
/// Hidden layers use the configured activation; the output layer is
/// `Identity` so the loss sees raw logits.
#[derive(Debug)]
pub struct VoxelNet {
    pub layers: Vec<PointwiseLayer>,
    training: bool,
}

impl VoxelNet {
    pub fn new<R: Rng + ?Sized>(settings: &VoxelNetSettings, rng: &mut R) -> Result<VoxelNet> {
        let channels = settings.num_channels
            .filter(|&c| c > 0)
            .ok_or_else(|| TrainError::config("model_settings.num_channels must be set and non-zero"))?;

        let mut layers = Vec::with_capacity(settings.hidden_sizes.len() + 1);
        let mut input_size = channels;
        for (i, &size) in settings.hidden_sizes.iter().enumerate() {
            layers.push(PointwiseLayer::new(&format!("layers.{i}"), input_size, size, settings.activation, rng));
            input_size = size;
        }
        layers.push(PointwiseLayer::new(
            &format!("layers.{}", settings.hidden_sizes.len()),
            input_size,
            settings.output_classes,
            ActivationFunction::Identity,
            rng,
        ));
        Ok(VoxelNet { layers, training: true })
    }

    /// Builds the network from an opaque `model_settings` block, injecting
    /// the channel count observed in the data.
    pub fn from_settings<R: Rng + ?Sized>(
        model_settings: &serde_json::Value,
        num_channels: usize,
        rng: &mut R,
    ) -> Result<VoxelNet> {
        let mut settings = VoxelNetSettings::from_value(model_settings)?;
        settings.num_channels = Some(num_channels);
        VoxelNet::new(&settings, rng)
    }

    pub fn output_classes(&self) -> usize {
        self.layers.last().map(|l| l.size()).unwrap_or(0)
    }

    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Model for VoxelNet {
    fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let keep_cache = self.training;
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current, keep_cache)?;
        }
        Ok(current)
    }

    fn backward(&mut self, grad_logits: &Tensor) -> Result<()> {
        if !self.training {
            return Err(TrainError::model("backward is only available in training mode"));
        }
        let mut grad = grad_logits.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<&Param> {
        self.layers.iter().flat_map(|l| [&l.weights, &l.biases]).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| [&mut l.weights, &mut l.biases]).collect()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
