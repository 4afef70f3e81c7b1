pub mod accumulation;
pub mod checkpoint;
pub mod epoch_stats;
pub mod loop_fn;
pub mod policy;
pub mod run;
pub mod train_config;
pub mod trainer;

pub use accumulation::AccumulationScheduler;
pub use checkpoint::CheckpointManager;
pub use epoch_stats::EpochStats;
pub use loop_fn::TrainReport;
pub use policy::{EvaluationPolicy, HoldoutEvaluation, NeverStop, NoEvaluation, PlateauStopping, StoppingPolicy};
pub use run::{BatchStep, EpochRecord, LoopState, TrainingRun};
pub use train_config::TrainSettings;
pub use trainer::{Collaborators, Trainer};
