pub mod cross_entropy;
pub mod dice_ce;
pub mod loss_function;
pub mod loss_type;

pub use cross_entropy::CrossEntropyLoss;
pub use dice_ce::DiceCeLoss;
pub use loss_function::{LossFunction, LossOutput};
pub use loss_type::LossType;
