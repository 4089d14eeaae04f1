//! Lucent Training
//!
//! Training orchestration for paired image-to-image restoration models:
//! - Discovering and validating paired train/test datasets (`index`)
//! - A shuffled, repeated, prefetching decode/crop pipeline (`pipeline`)
//! - Multi-scale reconstruction loss over an output pyramid (`loss`)
//! - Checkpoint persistence, retention and interactive resume (`checkpoint`, `resume`)
//! - The step loop with its periodic log/summary/checkpoint schedule (`trainer`)

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod index;
pub mod loss;
pub mod model;
pub mod optim;
pub mod pipeline;
pub mod progress;
pub mod resume;
pub mod summary;
pub mod tensor;
pub mod trainer;

pub use checkpoint::{CheckpointManager, CheckpointRecord, TrainingState};
pub use config::TrainingConfig;
pub use error::{TrainingError, TrainingResult};
pub use index::DatasetIndex;
pub use model::{ImageBatch, Model, OutputPyramid};
pub use optim::{polynomial_decay, Adam, AdamState};
pub use pipeline::{Batch, Pipeline};
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, StdoutProgressSink};
pub use resume::ResumeDecision;
pub use summary::{run_signature, DirectorySink, NullSink, SummarySink};
pub use tensor::{DecodeKind, ImageTensor};
pub use trainer::{RestorationTrainer, TrainerStatus, TrainingReport};
