//! Lucent CLI - Command-line entry point for the Lucent training loop
//!
//! Trains the restoration model on a paired image dataset, with
//! checkpoint/resume support and on-disk training summaries.

use anyhow::{Context, Result};
use clap::Parser;
use lucent_model::AffineRestorer;
use lucent_training::progress::StdoutProgressSink;
use lucent_training::{resume, RestorationTrainer, TrainingConfig};
use std::io::Write;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Lucent - multi-scale image restoration trainer
#[derive(Parser, Debug)]
#[command(
    name = "lucent",
    author,
    version,
    about = "Train a multi-scale image restoration model on paired data"
)]
struct Args {
    /// Batch size
    #[arg(long = "bch", default_value_t = 16)]
    batch_size: usize,

    /// Number of epochs over the training set
    #[arg(long = "ep", default_value_t = 10_000)]
    epochs: usize,

    /// Initial learning rate (decays polynomially to zero)
    #[arg(long = "lr", default_value_t = 1e-4)]
    learning_rate: f32,

    /// Square crop edge applied to every training pair
    #[arg(long, default_value_t = 256)]
    crop_size: usize,

    /// Dataset root holding train/{input,groundtruth} and test/{input,groundtruth}
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Directory for checkpoint snapshots
    #[arg(long, default_value = "./checkpoints")]
    checkpoints_dir: PathBuf,

    /// Directory for scalar and image summaries
    #[arg(long, default_value = "./summaries")]
    summaries_dir: PathBuf,

    /// Start from scratch without prompting
    #[arg(long, conflicts_with = "resume")]
    start: bool,

    /// Resume from a named checkpoint without prompting
    #[arg(long)]
    resume: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level: Level = args
        .log_level
        .parse()
        .with_context(|| format!("invalid log level: {}", args.log_level))?;
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default tracing subscriber failed")?;

    let config = TrainingConfig {
        batch_size: args.batch_size,
        epochs: args.epochs,
        learning_rate: args.learning_rate,
        crop_size: args.crop_size,
        data_dir: args.data_dir,
        checkpoints_dir: args.checkpoints_dir,
        summaries_dir: args.summaries_dir,
        ..TrainingConfig::default()
    };

    let non_interactive = args.start || args.resume.is_some();
    let start = args.start;
    let resume_name = args.resume;

    // The loop is CPU and filesystem bound; keep it off the async runtime.
    let report = tokio::task::spawn_blocking(move || {
        let trainer = RestorationTrainer::new(config);
        let mut model = AffineRestorer::new(trainer.config().n_levels);
        trainer.run(
            &mut model,
            |checkpoints| {
                if non_interactive {
                    resume::decide_from_flags(checkpoints, start, resume_name.as_deref())
                } else {
                    let stdin = std::io::stdin();
                    let mut input = stdin.lock();
                    let mut output = std::io::stdout();
                    let decision = resume::decide(checkpoints, &mut input, &mut output);
                    output.flush().ok();
                    decision
                }
            },
            &StdoutProgressSink,
        )
    })
    .await
    .context("training task panicked")??;

    println!(
        "training finished at step {} ({} steps run, final loss {:.5})",
        report.final_step, report.steps_run, report.final_loss
    );
    Ok(())
}
