pub mod adam;
pub mod optimizer;
pub mod optimizer_type;
pub mod sgd;

pub use adam::Adam;
pub use optimizer::Optimizer;
pub use optimizer_type::OptimizerType;
pub use sgd::Sgd;
