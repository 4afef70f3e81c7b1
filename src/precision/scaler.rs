//! Dynamic loss scaling for mixed-precision training.

use tracing::debug;

use crate::model::param::Param;

/// Scale-factor policy for `GradScaler`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerConfig {
    pub init_scale: f32,
    /// Multiplier applied after `growth_interval` consecutive good steps.
    pub growth_factor: f32,
    /// Multiplier applied on overflow.
    pub backoff_factor: f32,
    pub growth_interval: usize,
    /// Floor for the scale after backoff.
    pub min_scale: f32,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        ScalerConfig {
            init_scale: 65536.0, // 2^16
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
            min_scale: 1.0,
        }
    }
}

/// Loss-scale state machine.
///
/// Grows the scale by `growth_factor` after `growth_interval` consecutive
/// overflow-free steps, shrinks it by `backoff_factor` on overflow, and
/// never lets it drop below `min_scale`. A disabled scaler is pinned at 1.
#[derive(Debug, Clone)]
pub struct GradScaler {
    config: ScalerConfig,
    scale: f32,
    enabled: bool,
    good_steps: usize,
    overflow_count: usize,
}

impl GradScaler {
    pub fn new(config: ScalerConfig) -> Self {
        let scale = config.init_scale.max(config.min_scale);
        GradScaler { config, scale, enabled: true, good_steps: 0, overflow_count: 0 }
    }

    /// A scaler for full-precision runs: scale fixed at 1, never adjusted.
    pub fn disabled() -> Self {
        GradScaler {
            config: ScalerConfig::default(),
            scale: 1.0,
            enabled: false,
            good_steps: 0,
            overflow_count: 0,
        }
    }

    pub fn scale(&self) -> f32 {
        if self.enabled { self.scale } else { 1.0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    /// Divides every gradient by the current scale in place.
    ///
    /// Returns `true` when all unscaled gradients are finite.
    pub fn unscale_and_check(&self, params: &mut [&mut Param]) -> bool {
        let inv_scale = 1.0 / self.scale();
        let mut finite = true;
        for param in params.iter_mut() {
            for g in param.grad.data.iter_mut() {
                *g *= inv_scale;
                finite &= g.is_finite();
            }
        }
        finite
    }

    /// Advances the state machine after a due step.
    pub fn update(&mut self, found_overflow: bool) {
        if !self.enabled {
            return;
        }
        if found_overflow {
            self.overflow_count += 1;
            self.good_steps = 0;
            self.scale = (self.scale * self.config.backoff_factor).max(self.config.min_scale);
            debug!(scale = self.scale, "loss scale backed off");
        } else {
            self.good_steps += 1;
            if self.good_steps >= self.config.growth_interval {
                self.good_steps = 0;
                let grown = self.scale * self.config.growth_factor;
                // Growing into inf would poison every later step.
                if grown.is_finite() {
                    self.scale = grown;
                    debug!(scale = self.scale, "loss scale grown");
                }
            }
        }
    }
}
