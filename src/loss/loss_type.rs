use serde::{Serialize, Deserialize};

use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::dice_ce::DiceCeLoss;
use crate::loss::loss_function::LossFunction;

/// Selects which loss function the training loop builds at start-up.
///
/// - `DiceCe`       — soft Dice + cross-entropy on softmax probabilities;
///   robust to the heavy background/foreground imbalance of lesion masks.
/// - `CrossEntropy` — plain voxel-wise cross-entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    #[default]
    DiceCe,
    CrossEntropy,
}

impl LossType {
    pub fn build(&self) -> Box<dyn LossFunction> {
        match self {
            LossType::DiceCe       => Box::new(DiceCeLoss::default()),
            LossType::CrossEntropy => Box::new(CrossEntropyLoss),
        }
    }
}
