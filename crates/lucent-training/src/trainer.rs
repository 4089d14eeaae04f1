use crate::checkpoint::{CheckpointManager, TrainingState};
use crate::config::TrainingConfig;
use crate::error::{TrainingError, TrainingResult};
use crate::index::DatasetIndex;
use crate::loss;
use crate::model::Model;
use crate::optim::{polynomial_decay, Adam};
use crate::pipeline::Pipeline;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::resume::ResumeDecision;
use crate::summary::{run_signature, DirectorySink, NullSink, SummarySink};
use crate::tensor::DecodeKind;
use anyhow::anyhow;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// Lifecycle of one training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainerStatus {
    Idle,
    Initializing,
    Running,
    Completed,
    Diverged,
    Failed(String),
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub final_step: u64,
    pub final_loss: f32,
    pub steps_run: u64,
}

/// Drives the step loop: eager validation, resume resolution, one
/// optimization step per iteration, and the periodic log/summary/
/// checkpoint/test schedule.
pub struct RestorationTrainer {
    config: TrainingConfig,
    status: Arc<Mutex<TrainerStatus>>,
}

impl RestorationTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config, status: Arc::new(Mutex::new(TrainerStatus::Idle)) }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn status(&self) -> TrainerStatus {
        self.status.lock().map(|s| s.clone()).unwrap_or(TrainerStatus::Idle)
    }

    fn set_status(&self, status: TrainerStatus) {
        if let Ok(mut s) = self.status.lock() {
            *s = status;
        }
    }

    /// Run training to completion.
    ///
    /// `resolve` turns the discovered checkpoint list into a fresh-vs-resume
    /// decision; callers wire it to the interactive prompt or to CLI flags.
    pub fn run(
        &self,
        model: &mut dyn Model,
        resolve: impl FnOnce(&[String]) -> TrainingResult<ResumeDecision>,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<TrainingReport> {
        match self.run_inner(model, resolve, progress) {
            Ok(report) => {
                self.set_status(TrainerStatus::Completed);
                Ok(report)
            }
            Err(TrainingError::Diverged { step }) => {
                self.set_status(TrainerStatus::Diverged);
                Err(TrainingError::Diverged { step })
            }
            Err(e) => {
                self.set_status(TrainerStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn run_inner(
        &self,
        model: &mut dyn Model,
        resolve: impl FnOnce(&[String]) -> TrainingResult<ResumeDecision>,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<TrainingReport> {
        self.set_status(TrainerStatus::Initializing);
        let cfg = &self.config;

        // Validation runs before any pipeline or worker is allocated.
        cfg.validate()?;
        if model.n_levels() != cfg.n_levels {
            return Err(TrainingError::Configuration(format!(
                "model emits {} pyramid levels, configuration expects {}",
                model.n_levels(),
                cfg.n_levels
            )));
        }

        let index = DatasetIndex::discover(&cfg.data_dir, cfg.batch_size)?;
        let decode_kind = index.decode_kind()?;
        let batches_per_epoch = index.batches_per_epoch(cfg.batch_size);
        let max_steps = (cfg.epochs * batches_per_epoch) as u64;

        info!(
            "number of training data: {}; batches per epoch: {} (batch size = {}); training steps for {} epochs: {}",
            index.train_inputs.len(),
            batches_per_epoch,
            cfg.batch_size,
            cfg.epochs,
            max_steps
        );

        let mut has_test = index.has_test_data();
        if has_test {
            if index.test_inputs.len() < cfg.batch_size {
                warn!(
                    "test split ({} pairs) is smaller than the batch size; test evaluation disabled",
                    index.test_inputs.len()
                );
                has_test = false;
            } else {
                info!("number of test data: {}", index.test_inputs.len());
            }
        }

        let manager = CheckpointManager::new(cfg.checkpoints_dir.clone())
            .with_retention(cfg.max_checkpoints, cfg.keep_checkpoint_every_secs);
        let checkpoints = manager.list()?;
        let decision = resolve(&checkpoints)?;

        let mut adam = Adam::new();
        let start_step = match decision {
            ResumeDecision::FreshStart => {
                info!("starting training from scratch");
                0
            }
            ResumeDecision::ResumeFrom(name) => {
                let state = manager.load(&name)?;
                if state.params.len() != model.params().len() {
                    return Err(TrainingError::Checkpoint(format!(
                        "checkpoint {name} holds {} parameters, model expects {}",
                        state.params.len(),
                        model.params().len()
                    )));
                }
                model.params_mut().copy_from_slice(&state.params);
                adam.state = state.optimizer;
                info!("checkpoint {name} loaded; resuming from step {}", state.global_step + 1);
                state.global_step + 1
            }
        };

        if start_step >= max_steps {
            info!("resumed step {start_step} is at or past max_steps {max_steps}; nothing to do");
            return Ok(TrainingReport {
                final_step: start_step.saturating_sub(1),
                final_loss: 0.0,
                steps_run: 0,
            });
        }

        let signature = run_signature(index.train_inputs.len(), cfg.batch_size, cfg.epochs);
        let mut sink = DirectorySink::create(&cfg.summaries_dir, &signature)?;

        let mut pipeline = Pipeline::build(
            index.train_pairs(),
            decode_kind,
            cfg.crop_size,
            cfg.batch_size,
            cfg.epochs,
        )?;

        self.set_status(TrainerStatus::Running);
        progress.on_event(ProgressEvent::Started { start_step, max_steps });

        let mut last_loss = 0.0f32;
        for step in start_step..max_steps {
            let start_time = Instant::now();

            let batch = pipeline
                .next_batch()
                .ok_or_else(|| TrainingError::Other(anyhow!(
                    "training pipeline ended before step {step}"
                )))??;

            let is_final = step == max_steps - 1;
            let want_summary = step % cfg.summary_interval == 0 || is_final;
            let lr = polynomial_decay(cfg.learning_rate, step, max_steps, 0.0, 0.3);

            let outputs = model.forward(&batch.input);
            let loss_out = if want_summary {
                let out = loss::evaluate(&outputs, &batch.ground_truth, step, &mut sink)?;
                sink.image(step, "img_in", &batch.input[0])?;
                sink.image(step, "img_gt", &batch.ground_truth[0])?;
                sink.scalar(step, "learning_rate", lr)?;
                out
            } else {
                loss::evaluate(&outputs, &batch.ground_truth, step, &mut NullSink)?
            };

            let grads = model.backward(&batch.input, &loss_out.grad);
            adam.step(lr, model.params_mut(), &grads);

            // Fatal and unrecovered; the last persisted checkpoint is the
            // recovery point for a fresh process.
            if loss_out.total.is_nan() {
                return Err(TrainingError::Diverged { step });
            }

            if step % cfg.log_interval == 0 || is_final {
                let sec_per_batch = start_time.elapsed().as_secs_f32();
                let examples_per_sec = if sec_per_batch > 0.0 {
                    batch.len() as f32 / sec_per_batch
                } else {
                    0.0
                };
                info!(step, loss = loss_out.total, examples_per_sec, sec_per_batch, "train step");
                progress.on_event(ProgressEvent::Step {
                    step,
                    loss: loss_out.total,
                    examples_per_sec,
                    sec_per_batch,
                });
            }

            if step % cfg.checkpoint_interval == 0 || is_final {
                let state = TrainingState {
                    global_step: step,
                    params: model.params().to_vec(),
                    optimizer: adam.state.clone(),
                };
                let name = manager.save(&state)?;
                progress.on_event(ProgressEvent::CheckpointSaved { step, name });

                if has_test {
                    let test_loss = self.run_test_pass(model, &index, decode_kind)?;
                    sink.scalar(step, "test_loss", test_loss)?;
                    info!(step, test_loss, "loss on test dataset");
                    progress.on_event(ProgressEvent::TestLoss { step, loss: test_loss });
                }
            }

            last_loss = loss_out.total;
        }

        progress.on_event(ProgressEvent::Finished { final_step: max_steps - 1 });
        Ok(TrainingReport {
            final_step: max_steps - 1,
            final_loss: last_loss,
            steps_run: max_steps - start_step,
        })
    }

    /// One full pass over the test split; mean loss across its batches.
    fn run_test_pass(
        &self,
        model: &mut dyn Model,
        index: &DatasetIndex,
        decode_kind: DecodeKind,
    ) -> TrainingResult<f32> {
        let pipeline = Pipeline::build(
            index.test_pairs(),
            decode_kind,
            self.config.crop_size,
            self.config.batch_size,
            1,
        )?;

        let mut total = 0.0f32;
        let mut batches = 0u32;
        for batch in pipeline {
            let batch = batch?;
            let outputs = model.forward(&batch.input);
            let out = loss::evaluate(&outputs, &batch.ground_truth, 0, &mut NullSink)?;
            total += out.total;
            batches += 1;
        }
        Ok(if batches > 0 { total / batches as f32 } else { 0.0 })
    }
}
