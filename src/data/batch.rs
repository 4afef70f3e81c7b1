use crate::error::{Result, TrainError};
use crate::math::tensor::Tensor;
use crate::precision::device::Device;

/// One training example: an image volume `[C, D, H, W]` and its label
/// volume `[1, D, H, W]` of class indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Tensor,
    pub label: Tensor,
}

/// A mini-batch: samples stacked along a new leading batch dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub image: Tensor,
    pub label: Tensor,
}

impl Batch {
    pub fn collate(samples: &[&Sample]) -> Result<Batch> {
        let images: Vec<&Tensor> = samples.iter().map(|s| &s.image).collect();
        let labels: Vec<&Tensor> = samples.iter().map(|s| &s.label).collect();
        let batch = Batch { image: Tensor::stack(&images)?, label: Tensor::stack(&labels)? };
        batch.validate()?;
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.image.batch_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image and label must agree on batch size and spatial extent.
    pub fn validate(&self) -> Result<()> {
        let mut expected = vec![self.image.batch_size(), 1];
        expected.extend_from_slice(self.image.spatial_shape());
        if self.label.shape != expected {
            return Err(TrainError::shape_mismatch(&expected, &self.label.shape));
        }
        Ok(())
    }

    /// Moves both tensors to `device`.
    pub fn to_device(self, device: Device) -> Result<Batch> {
        match device {
            Device::Cpu => Ok(self),
            Device::Gpu => Err(TrainError::config("no GPU backend is available for tensor transfer")),
        }
    }
}
