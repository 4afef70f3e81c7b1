use serde::{Serialize, Deserialize};
use std::f32::consts::PI;

/// Element-wise activation applied after each pointwise layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    #[default]
    Relu,
    LeakyRelu { alpha: f32 },
    Gelu,
    Sigmoid,
    Tanh,
    /// Used on the output layer so it emits raw class logits.
    Identity,
}

impl ActivationFunction {
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Relu => x.max(0.0),
            ActivationFunction::LeakyRelu { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Gelu => {
                let c = (2.0_f32 / PI).sqrt();
                0.5 * x * (1.0 + (c * (x + 0.044715 * x.powi(3))).tanh())
            }
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Identity => x,
        }
    }

    /// Derivative with respect to the pre-activation `x`.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Relu => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::LeakyRelu { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Gelu => {
                let c = (2.0_f32 / PI).sqrt();
                let tanh_inner = (c * (x + 0.044715 * x.powi(3))).tanh();
                let sech2 = 1.0 - tanh_inner * tanh_inner;
                let d_inner = c * (1.0 + 3.0 * 0.044715 * x.powi(2));
                0.5 * (1.0 + tanh_inner) + 0.5 * x * sech2 * d_inner
            }
            ActivationFunction::Sigmoid => {
                let s = self.function(x);
                s * (1.0 - s)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Identity => 1.0,
        }
    }

    /// Variance gain for weight initialization feeding into this activation.
    pub fn init_gain(&self) -> f32 {
        match self {
            ActivationFunction::Relu
            | ActivationFunction::LeakyRelu { .. }
            | ActivationFunction::Gelu => 2.0,
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_match_finite_differences() {
        let h = 1e-3;
        let all = [
            ActivationFunction::Relu,
            ActivationFunction::LeakyRelu { alpha: 0.1 },
            ActivationFunction::Gelu,
            ActivationFunction::Sigmoid,
            ActivationFunction::Tanh,
            ActivationFunction::Identity,
        ];
        for act in all {
            for &x in &[-1.7f32, -0.4, 0.3, 1.2] {
                let numeric = (act.function(x + h) - act.function(x - h)) / (2.0 * h);
                assert!(
                    (numeric - act.derivative(x)).abs() < 1e-2,
                    "{act:?} at {x}: numeric {numeric} vs analytic {}",
                    act.derivative(x)
                );
            }
        }
    }

    #[test]
    fn deserializes_from_snake_case() {
        let act: ActivationFunction = serde_json::from_str("{\"leaky_relu\":{\"alpha\":0.2}}").unwrap();
        assert_eq!(act, ActivationFunction::LeakyRelu { alpha: 0.2 });
        let act: ActivationFunction = serde_json::from_str("\"gelu\"").unwrap();
        assert_eq!(act, ActivationFunction::Gelu);
    }
}
