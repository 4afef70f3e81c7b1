pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod model;
pub mod loss;
pub mod optim;
pub mod precision;
pub mod data;
pub mod logging;
pub mod train;

// Convenience re-exports
pub use error::{Result, TrainError};
pub use math::tensor::Tensor;
pub use activation::activation::ActivationFunction;
pub use model::{Model, VoxelNet};
pub use loss::{DiceCeLoss, LossFunction, LossType};
pub use optim::{Adam, Optimizer, OptimizerType, Sgd};
pub use precision::{Device, GradScaler, Precision, PrecisionManager, StepOutcome};
pub use data::{Batch, BatchLoader, InMemoryLoader, Sample, SyntheticVolumes};
pub use logging::{EventLogWriter, MemorySink, MetricSink, OverlayVisualizer, Visualizer};
pub use train::{CheckpointManager, Collaborators, TrainReport, TrainSettings, Trainer};
