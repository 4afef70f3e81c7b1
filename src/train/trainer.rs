use std::sync::mpsc;
use tracing::info;

use crate::data::loader::BatchLoader;
use crate::error::{Result, TrainError};
use crate::logging::sink::MetricSink;
use crate::logging::visualize::Visualizer;
use crate::loss::loss_function::LossFunction;
use crate::model::model::Model;
use crate::optim::optimizer::Optimizer;
use crate::precision::device::Device;
use crate::precision::manager::PrecisionManager;
use crate::train::accumulation::AccumulationScheduler;
use crate::train::checkpoint::CheckpointManager;
use crate::train::epoch_stats::EpochStats;
use crate::train::policy::{EvaluationPolicy, NeverStop, NoEvaluation, PlateauStopping, StoppingPolicy};
use crate::train::run::{LoopState, TrainingRun};
use crate::train::train_config::TrainSettings;

/// External pieces the trainer drives but does not define.
pub struct Collaborators {
    pub model: Box<dyn Model>,
    pub loader: Box<dyn BatchLoader>,
    pub visualizer: Box<dyn Visualizer>,
    pub sink: Box<dyn MetricSink>,
}

/// Epoch/batch loop controller.
///
/// Construction performs the `Initializing` phase: settings validation,
/// device resolution, a non-empty loader check, optimizer and loss
/// construction and, when resuming, restoring the latest checkpoint. `run` then drives the epochs.
pub struct Trainer {
    pub(crate) settings: TrainSettings,
    pub(crate) model: Box<dyn Model>,
    pub(crate) loader: Box<dyn BatchLoader>,
    pub(crate) visualizer: Box<dyn Visualizer>,
    pub(crate) sink: Box<dyn MetricSink>,
    pub(crate) optimizer: Box<dyn Optimizer>,
    pub(crate) loss_fn: Box<dyn LossFunction>,
    pub(crate) precision: PrecisionManager,
    pub(crate) scheduler: AccumulationScheduler,
    pub(crate) checkpoints: CheckpointManager,
    pub(crate) stopping: Box<dyn StoppingPolicy>,
    pub(crate) evaluation: Box<dyn EvaluationPolicy>,
    pub(crate) progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub(crate) run: TrainingRun,
}

impl Trainer {
    pub fn new(settings: TrainSettings, parts: Collaborators) -> Result<Trainer> {
        settings.validate()?;
        let device = Device::resolve(settings.device)?;
        let precision = PrecisionManager::new(device, settings.mixed_precision);

        let mut run = TrainingRun::new(device, precision.precision());
        run.transition(LoopState::Initializing)?;

        let Collaborators { mut model, loader, visualizer, sink } = parts;
        if loader.num_batches() == 0 {
            return Err(TrainError::config(format!(
                "the training loader yields no batches (batch_size {})",
                settings.batch_size
            )));
        }
        let checkpoints = CheckpointManager::new(&settings.checkpoint_dir);
        if settings.continue_training {
            let path = checkpoints.latest_path();
            let state = checkpoints.load(&path)?;
            model.load_state_dict(&state)?;
            info!(path = %path.display(), "resumed from checkpoint");
        }

        let stopping: Box<dyn StoppingPolicy> = match settings.early_stopping_epochs {
            Some(window) => Box::new(PlateauStopping { window }),
            None => Box::new(NeverStop),
        };

        info!(
            device = %device,
            precision = %precision.precision(),
            batch_size = settings.batch_size,
            learning_rate = settings.learning_rate,
            max_epochs = settings.max_epochs,
            accumulation = settings.batch_accumulation_iter,
            "trainer initialized"
        );

        Ok(Trainer {
            optimizer: settings.optimizer.build(settings.learning_rate),
            loss_fn: settings.loss.build(),
            scheduler: AccumulationScheduler::new(
                settings.batch_accumulation_iter,
                settings.renormalize_partial_window,
            )?,
            settings,
            model,
            loader,
            visualizer,
            sink,
            precision,
            checkpoints,
            stopping,
            evaluation: Box::new(NoEvaluation),
            progress_tx: None,
            run,
        })
    }

    pub fn with_loss_function(mut self, loss_fn: Box<dyn LossFunction>) -> Self {
        self.loss_fn = loss_fn;
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Replaces the precision manager, e.g. to start from a custom loss scale.
    pub fn with_precision(mut self, precision: PrecisionManager) -> Self {
        self.run.precision = precision.precision();
        self.precision = precision;
        self
    }

    pub fn with_evaluation(mut self, evaluation: Box<dyn EvaluationPolicy>) -> Self {
        self.evaluation = evaluation;
        self
    }

    pub fn with_stopping(mut self, stopping: Box<dyn StoppingPolicy>) -> Self {
        self.stopping = stopping;
        self
    }

    /// Sends one `EpochStats` per completed epoch to `tx`.
    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn settings(&self) -> &TrainSettings {
        &self.settings
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn training_run(&self) -> &TrainingRun {
        &self.run
    }

    pub fn precision(&self) -> &PrecisionManager {
        &self.precision
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }
}
