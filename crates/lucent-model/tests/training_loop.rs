//! End-to-end runs of the step loop against `AffineRestorer` on a small
//! synthetic dataset.

use lucent_model::AffineRestorer;
use lucent_training::model::{ImageBatch, Model, OutputPyramid};
use lucent_training::progress::{ProgressEvent, ProgressSink};
use lucent_training::resume::ResumeDecision;
use lucent_training::trainer::{RestorationTrainer, TrainerStatus};
use lucent_training::{CheckpointManager, TrainingConfig, TrainingError};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

fn write_marker_png(path: &Path, height: u32, width: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([y as u8, x as u8, (x ^ y) as u8])
    });
    img.save(path).unwrap();
}

fn setup_dataset(root: &Path, train_pairs: usize, test_pairs: usize) {
    for (split, count) in [("train", train_pairs), ("test", test_pairs)] {
        if count == 0 {
            continue;
        }
        let input = root.join(split).join("input");
        let gt = root.join(split).join("groundtruth");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&gt).unwrap();
        for i in 0..count {
            write_marker_png(&input.join(format!("{i}.png")), 16, 16);
            write_marker_png(&gt.join(format!("{i}.png")), 16, 16);
        }
    }
}

fn small_config(root: &Path) -> TrainingConfig {
    TrainingConfig {
        batch_size: 2,
        epochs: 4,
        learning_rate: 1e-3,
        crop_size: 8,
        n_levels: 3,
        scale: 0.5,
        data_dir: root.join("data"),
        checkpoints_dir: root.join("checkpoints"),
        summaries_dir: root.join("summaries"),
        log_interval: 1,
        summary_interval: 4,
        checkpoint_interval: 4,
        max_checkpoints: 100,
        keep_checkpoint_every_secs: 3600,
    }
}

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for CollectingSink {
    fn on_event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl CollectingSink {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[test]
fn test_fresh_run_completes_with_checkpoints_and_summaries() {
    let temp = TempDir::new().unwrap();
    setup_dataset(&temp.path().join("data"), 4, 2);
    let config = small_config(temp.path());

    // 4 pairs, batch 2, 4 epochs => 8 steps (0..=7).
    let trainer = RestorationTrainer::new(config.clone());
    let mut model = AffineRestorer::new(3);
    let sink = CollectingSink::default();
    let report = trainer
        .run(&mut model, |_| Ok(ResumeDecision::FreshStart), &sink)
        .unwrap();

    assert_eq!(report.final_step, 7);
    assert_eq!(report.steps_run, 8);
    assert_eq!(trainer.status(), TrainerStatus::Completed);

    let manager = CheckpointManager::new(config.checkpoints_dir.clone());
    let names = manager.list().unwrap();
    assert_eq!(
        names,
        vec!["lucent.model-0", "lucent.model-4", "lucent.model-7"]
    );

    let signature_dir = config.summaries_dir.join("data4_bch2_ep4");
    assert!(signature_dir.join("scalars.jsonl").exists());
    assert!(signature_dir.join("images").is_dir());

    let events = sink.events();
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::Started { start_step: 0, max_steps: 8 })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::TestLoss { step: 4, .. })));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Finished { final_step: 7 })
    ));
}

#[test]
fn test_resume_restarts_one_step_past_the_checkpoint() {
    let temp = TempDir::new().unwrap();
    setup_dataset(&temp.path().join("data"), 4, 0);
    let config = small_config(temp.path());

    let trainer = RestorationTrainer::new(config.clone());
    let mut model = AffineRestorer::new(3);
    trainer
        .run(&mut model, |_| Ok(ResumeDecision::FreshStart), &sink_of_nothing())
        .unwrap();

    // Second process: pick the checkpoint from step 4 out of the offered
    // list, as the interactive prompt would.
    let resumed = RestorationTrainer::new(config);
    let mut fresh_model = AffineRestorer::new(3);
    let sink = CollectingSink::default();
    let report = resumed
        .run(
            &mut fresh_model,
            |names| {
                assert!(names.contains(&"lucent.model-4".to_string()));
                Ok(ResumeDecision::ResumeFrom("lucent.model-4".to_string()))
            },
            &sink,
        )
        .unwrap();

    assert_eq!(report.steps_run, 3);
    assert_eq!(report.final_step, 7);
    let events = sink.events();
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::Started { start_step: 5, max_steps: 8 })
    ));
    assert!(events
        .iter()
        .all(|e| !matches!(e, ProgressEvent::Step { step, .. } if *step < 5)));
}

#[test]
fn test_resume_at_final_step_runs_nothing() {
    let temp = TempDir::new().unwrap();
    setup_dataset(&temp.path().join("data"), 4, 0);
    let config = small_config(temp.path());

    let trainer = RestorationTrainer::new(config.clone());
    let mut model = AffineRestorer::new(3);
    trainer
        .run(&mut model, |_| Ok(ResumeDecision::FreshStart), &sink_of_nothing())
        .unwrap();

    let resumed = RestorationTrainer::new(config);
    let mut model = AffineRestorer::new(3);
    let report = resumed
        .run(
            &mut model,
            |_| Ok(ResumeDecision::ResumeFrom("lucent.model-7".to_string())),
            &sink_of_nothing(),
        )
        .unwrap();
    assert_eq!(report.steps_run, 0);
}

/// Wraps a working model and poisons every output with NaN after a set
/// number of forward passes.
struct SaboteurModel {
    inner: AffineRestorer,
    forward_calls: usize,
    poison_after: usize,
}

impl Model for SaboteurModel {
    fn n_levels(&self) -> usize {
        self.inner.n_levels()
    }

    fn forward(&mut self, input: &ImageBatch) -> OutputPyramid {
        let mut out = self.inner.forward(input);
        self.forward_calls += 1;
        if self.forward_calls > self.poison_after {
            for level in &mut out {
                for img in level {
                    for v in &mut img.data {
                        *v = f32::NAN;
                    }
                }
            }
        }
        out
    }

    fn backward(&mut self, input: &ImageBatch, grad_output: &OutputPyramid) -> Vec<f32> {
        self.inner.backward(input, grad_output)
    }

    fn params(&self) -> &[f32] {
        self.inner.params()
    }

    fn params_mut(&mut self) -> &mut [f32] {
        self.inner.params_mut()
    }
}

#[test]
fn test_divergence_aborts_but_keeps_boundary_checkpoints() {
    let temp = TempDir::new().unwrap();
    setup_dataset(&temp.path().join("data"), 4, 0);
    let mut config = small_config(temp.path());
    config.checkpoint_interval = 2;

    let trainer = RestorationTrainer::new(config.clone());
    // Steps 0..=4 are healthy; the sixth forward pass (step 5) emits NaN.
    let mut model = SaboteurModel {
        inner: AffineRestorer::new(3),
        forward_calls: 0,
        poison_after: 5,
    };
    let err = trainer
        .run(&mut model, |_| Ok(ResumeDecision::FreshStart), &sink_of_nothing())
        .unwrap_err();

    assert!(matches!(err, TrainingError::Diverged { step: 5 }));
    assert_eq!(trainer.status(), TrainerStatus::Diverged);

    // Checkpoints from steps 0, 2 and 4 predate the divergence and stay
    // loadable with finite parameters.
    let manager = CheckpointManager::new(config.checkpoints_dir.clone());
    let names = manager.list().unwrap();
    assert_eq!(
        names,
        vec!["lucent.model-0", "lucent.model-2", "lucent.model-4"]
    );
    let state = manager.load("lucent.model-4").unwrap();
    assert!(state.params.iter().all(|p| p.is_finite()));
}

fn sink_of_nothing() -> lucent_training::NullProgressSink {
    lucent_training::NullProgressSink
}
