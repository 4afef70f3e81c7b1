use half::f16;
use std::fmt;

use crate::math::tensor::Tensor;

/// Numeric format used inside the forward/loss scope.
///
/// Master weights and gradient buffers are always f32; `Fp16` only
/// controls how activations, logits and the backward signal are rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Fp32,
    Fp16,
}

impl Precision {
    pub fn for_run(mixed_precision: bool) -> Precision {
        if mixed_precision { Precision::Fp16 } else { Precision::Fp32 }
    }

    pub fn is_reduced(&self) -> bool {
        *self != Precision::Fp32
    }

    /// Rounds one value through the reduced format. Values beyond the
    /// f16 range become ±inf, exactly as a half-precision kernel would.
    pub fn round(&self, x: f32) -> f32 {
        match self {
            Precision::Fp32 => x,
            Precision::Fp16 => f16::from_f32(x).to_f32(),
        }
    }

    pub fn round_tensor(&self, t: &Tensor) -> Tensor {
        match self {
            Precision::Fp32 => t.clone(),
            Precision::Fp16 => t.map(|x| f16::from_f32(x).to_f32()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
