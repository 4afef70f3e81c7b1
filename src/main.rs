//! Trains a voxel segmentation model on synthetic lesion volumes.
//!
//! Usage:
//!   voxseg [--config settings.json] [--continue] [--epochs N] [--no-mixed-precision]
//!
//! Checkpoints go to `<checkpoint_dir>/model_latest.pt` and
//! `<checkpoint_dir>/model_best(<epoch>).pt`; scalar and image logs go to a
//! fresh directory under `<log_dir>`, browsable with the `board` binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use voxseg::data::loader::{random_split, InMemoryLoader};
use voxseg::logging::event_log::EventLogWriter;
use voxseg::logging::visualize::OverlayVisualizer;
use voxseg::model::voxel_net::VoxelNet;
use voxseg::train::epoch_stats::EpochStats;
use voxseg::train::policy::HoldoutEvaluation;
use voxseg::train::train_config::TrainSettings;
use voxseg::train::trainer::{Collaborators, Trainer};
use voxseg::{Result, TrainError};

#[derive(Parser)]
#[command(name = "voxseg")]
#[command(about = "Train a volumetric segmentation model with accumulation, mixed precision and checkpoints")]
#[command(version)]
struct Args {
    /// JSON settings file; omitted keys take their defaults
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Resume from <checkpoint_dir>/model_latest.pt
    #[arg(long = "continue")]
    continue_training: bool,

    /// Override max_epochs
    #[arg(short = 'e', long)]
    epochs: Option<usize>,

    /// Train in full f32 precision without loss scaling
    #[arg(long)]
    no_mixed_precision: bool,

    /// Print the default settings as JSON and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(args: &Args) -> Result<TrainSettings> {
    let mut settings = match &args.config {
        Some(path) => TrainSettings::load_json(path)?,
        None => TrainSettings::default(),
    };
    if args.continue_training {
        settings.continue_training = true;
    }
    if let Some(epochs) = args.epochs {
        settings.max_epochs = epochs;
    }
    if args.no_mixed_precision {
        settings.mixed_precision = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn run(args: Args) -> Result<()> {
    if args.print_default_config {
        println!("{}", serde_json::to_string_pretty(&TrainSettings::default())?);
        return Ok(());
    }
    let settings = load_settings(&args)?;

    let seed = settings.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    info!(seed, "generating synthetic dataset");

    let samples = settings.dataset.generate(&mut rng)?;
    let (train, held_out) = random_split(samples, settings.train_split, &mut rng)?;
    let channels = train
        .first()
        .map(|s| s.image.shape[0])
        .ok_or_else(|| TrainError::config("training split is empty"))?;
    info!(train = train.len(), held_out = held_out.len(), channels, "dataset split");

    let model = VoxelNet::from_settings(&settings.model_settings, channels, &mut rng)?;
    let loader = InMemoryLoader::new(train, settings.batch_size, seed)?;
    let sink = EventLogWriter::create(&settings.log_dir)?;

    let parts = Collaborators {
        model: Box::new(model),
        loader: Box::new(loader),
        visualizer: Box::new(OverlayVisualizer::default()),
        sink: Box::new(sink),
    };

    let (tx, rx) = mpsc::channel::<EpochStats>();
    let mut trainer = Trainer::new(settings.clone(), parts)?.with_progress(tx);
    if settings.evaluate && !held_out.is_empty() {
        let held_loader = InMemoryLoader::sequential(held_out, settings.batch_size)?;
        trainer = trainer.with_evaluation(Box::new(HoldoutEvaluation::new(Box::new(held_loader))));
    }

    let reporter = std::thread::spawn(move || {
        for stats in rx {
            let best = if stats.new_best { " *" } else { "" };
            match stats.val_loss {
                Some(val) => println!(
                    "epoch {:>4}/{}  train {:.5}  test {:.5}  ({} ms){best}",
                    stats.epoch, stats.total_epochs, stats.train_loss, val, stats.elapsed_ms
                ),
                None => println!(
                    "epoch {:>4}/{}  train {:.5}  ({} ms){best}",
                    stats.epoch, stats.total_epochs, stats.train_loss, stats.elapsed_ms
                ),
            }
        }
    });

    let report = trainer.run();
    // Dropping the trainer closes the progress channel.
    drop(trainer);
    let _ = reporter.join();
    let report = report?;

    info!(
        epochs = report.epochs.len(),
        final_loss = ?report.final_loss(),
        best_loss = ?report.best_loss,
        stopped_early = report.stopped_early,
        "done"
    );
    Ok(())
}
