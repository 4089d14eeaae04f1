use crate::error::{TrainingError, TrainingResult};
use std::path::PathBuf;

/// Hyperparameters and filesystem layout for one training run.
///
/// Validation is eager: `validate` is called before any pipeline or worker
/// is allocated so misconfiguration fails fast and cheaply.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Number of samples per optimization step.
    pub batch_size: usize,
    /// Number of full passes over the training path list.
    pub epochs: usize,
    /// Initial learning rate; decays polynomially to 0 over the run.
    pub learning_rate: f32,
    /// Square crop edge applied jointly to each input/ground-truth pair.
    pub crop_size: usize,
    /// Number of pyramid levels the model is expected to emit.
    pub n_levels: usize,
    /// Resolution ratio between consecutive pyramid levels.
    pub scale: f32,
    /// Root holding `train/{input,groundtruth}` and `test/{input,groundtruth}`.
    pub data_dir: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub summaries_dir: PathBuf,
    /// Log loss/throughput every this many steps.
    pub log_interval: u64,
    /// Persist summary diagnostics every this many steps.
    pub summary_interval: u64,
    /// Persist a checkpoint (and run the test pass) every this many steps.
    pub checkpoint_interval: u64,
    /// Count cap for checkpoint retention.
    pub max_checkpoints: usize,
    /// Keep at least one checkpoint per this many elapsed seconds,
    /// regardless of the count cap.
    pub keep_checkpoint_every_secs: i64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            epochs: 10_000,
            learning_rate: 1e-4,
            crop_size: 256,
            n_levels: 3,
            scale: 0.5,
            data_dir: PathBuf::from("./data"),
            checkpoints_dir: PathBuf::from("./checkpoints"),
            summaries_dir: PathBuf::from("./summaries"),
            log_interval: 10,
            summary_interval: 100,
            checkpoint_interval: 1000,
            max_checkpoints: 100,
            keep_checkpoint_every_secs: 3600,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::Configuration("batch_size must be >= 1".to_string()));
        }
        if self.epochs == 0 {
            return Err(TrainingError::Configuration("epochs must be >= 1".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::Configuration("learning_rate must be > 0".to_string()));
        }
        if self.crop_size == 0 {
            return Err(TrainingError::Configuration("crop_size must be >= 1".to_string()));
        }
        if self.n_levels == 0 {
            return Err(TrainingError::Configuration("n_levels must be >= 1".to_string()));
        }
        if self.log_interval == 0 || self.summary_interval == 0 || self.checkpoint_interval == 0 {
            return Err(TrainingError::Configuration(
                "log/summary/checkpoint intervals must be >= 1".to_string(),
            ));
        }
        if self.max_checkpoints == 0 {
            return Err(TrainingError::Configuration("max_checkpoints must be >= 1".to_string()));
        }
        Ok(())
    }
}
