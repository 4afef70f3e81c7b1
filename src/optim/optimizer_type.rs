use serde::{Serialize, Deserialize};

use crate::optim::adam::Adam;
use crate::optim::optimizer::Optimizer;
use crate::optim::sgd::Sgd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerType {
    /// Adam, betas (0.99, 0.999), weight decay 1e-5.
    #[default]
    Adam,
    Sgd,
}

impl OptimizerType {
    pub fn build(&self, learning_rate: f32) -> Box<dyn Optimizer> {
        match self {
            OptimizerType::Adam => Box::new(Adam::for_segmentation(learning_rate)),
            OptimizerType::Sgd  => Box::new(Sgd::new(learning_rate)),
        }
    }
}
