use image::{Rgb, RgbImage};

use crate::error::{Result, TrainError};
use crate::math::tensor::Tensor;

/// Renders a logging artifact from one input volume and its prediction.
pub trait Visualizer {
    /// `volume` is `[C, D, H, W]`, `prediction` is `[D, H, W]` class indices.
    fn render(&self, volume: &Tensor, prediction: &Tensor) -> Result<Vec<RgbImage>>;
}

/// Class colours; background (class 0) is never painted.
const PALETTE: [[u8; 3]; 6] = [
    [0, 0, 0],
    [230, 60, 50],
    [60, 200, 80],
    [50, 110, 235],
    [240, 200, 40],
    [190, 80, 220],
];

/// Axial slices of channel 0 in grey, with predicted foreground classes
/// alpha-blended on top.
#[derive(Debug, Clone)]
pub struct OverlayVisualizer {
    /// Relative depths in `[0, 1)` of the slices to render.
    pub slices: Vec<f32>,
    pub alpha: f32,
}

impl Default for OverlayVisualizer {
    fn default() -> Self {
        OverlayVisualizer { slices: vec![0.25, 0.5, 0.75], alpha: 0.4 }
    }
}

impl OverlayVisualizer {
    fn render_slice(&self, volume: &Tensor, prediction: &Tensor, z: usize) -> RgbImage {
        let (h, w) = (volume.shape[2], volume.shape[3]);
        let plane = h * w;
        let grey = &volume.data[z * plane..(z + 1) * plane];
        let labels = &prediction.data[z * plane..(z + 1) * plane];

        let (lo, hi) = grey.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
        let range = if hi > lo { hi - lo } else { 1.0 };

        RgbImage::from_fn(w as u32, h as u32, |x, y| {
            let idx = y as usize * w + x as usize;
            let g = ((grey[idx] - lo) / range).clamp(0.0, 1.0) * 255.0;
            let class = labels[idx].max(0.0) as usize;
            if class == 0 {
                let g = g as u8;
                return Rgb([g, g, g]);
            }
            let colour = PALETTE[1 + (class - 1) % (PALETTE.len() - 1)];
            let blend = |c: u8| ((1.0 - self.alpha) * g + self.alpha * c as f32) as u8;
            Rgb([blend(colour[0]), blend(colour[1]), blend(colour[2])])
        })
    }
}

impl Visualizer for OverlayVisualizer {
    fn render(&self, volume: &Tensor, prediction: &Tensor) -> Result<Vec<RgbImage>> {
        if volume.shape.len() != 4 {
            return Err(TrainError::model(format!(
                "overlay expects a [C, D, H, W] volume, got {:?}",
                volume.shape
            )));
        }
        let spatial = &volume.shape[1..];
        if prediction.shape != spatial {
            return Err(TrainError::shape_mismatch(spatial, &prediction.shape));
        }
        let depth = spatial[0];
        Ok(self
            .slices
            .iter()
            .map(|&rel| ((rel.clamp(0.0, 1.0) * depth as f32) as usize).min(depth.saturating_sub(1)))
            .map(|z| self.render_slice(volume, prediction, z))
            .collect())
    }
}
