use chrono::Local;

/// Step-loop notifications emitted by the trainer.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { start_step: u64, max_steps: u64 },
    Step { step: u64, loss: f32, examples_per_sec: f32, sec_per_batch: f32 },
    CheckpointSaved { step: u64, name: String },
    TestLoss { step: u64, loss: f32 },
    Finished { final_step: u64 },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { start_step, max_steps } => {
                println!("training: step {start_step} -> {max_steps}");
            }
            ProgressEvent::Step { step, loss, examples_per_sec, sec_per_batch } => {
                println!(
                    "{}: step {}, loss = {:.5} ({:.1} data/s; {:.3} s/bch)",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    step,
                    loss,
                    examples_per_sec,
                    sec_per_batch
                );
            }
            ProgressEvent::CheckpointSaved { step, name } => {
                println!("step {step}: saved checkpoint {name}");
            }
            ProgressEvent::TestLoss { step, loss } => {
                println!("step {step}: loss on test dataset: {loss}");
            }
            ProgressEvent::Finished { final_step } => {
                println!("--------End of training (step {final_step})--------");
            }
        }
    }
}

/// Sink that drops every event; used in tests and quiet runs.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}
