use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model diverged with loss = NaN at step {step}")]
    Diverged { step: u64 },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
