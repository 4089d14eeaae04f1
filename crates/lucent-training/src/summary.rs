use crate::error::TrainingResult;
use crate::tensor::ImageTensor;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Run configuration signature used as the per-run summary directory name.
pub fn run_signature(n_data: usize, batch_size: usize, epochs: usize) -> String {
    format!("data{n_data}_bch{batch_size}_ep{epochs}")
}

/// Sink for diagnostic recordings. Recordings are pure side effects; they
/// never influence the loss value.
pub trait SummarySink {
    fn scalar(&mut self, step: u64, tag: &str, value: f32) -> TrainingResult<()>;

    fn image(&mut self, step: u64, tag: &str, image: &ImageTensor) -> TrainingResult<()>;
}

/// Discards every recording; used on non-summary steps and in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl SummarySink for NullSink {
    fn scalar(&mut self, _step: u64, _tag: &str, _value: f32) -> TrainingResult<()> {
        Ok(())
    }

    fn image(&mut self, _step: u64, _tag: &str, _image: &ImageTensor) -> TrainingResult<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct ScalarRecord<'a> {
    step: u64,
    tag: &'a str,
    value: f32,
}

/// Writes scalars as JSONL and images as 8-bit PNG dumps under one
/// run-signature directory.
pub struct DirectorySink {
    images_dir: PathBuf,
    scalars: BufWriter<File>,
}

impl DirectorySink {
    /// Create (or append to) `summaries_dir/<signature>/`.
    pub fn create(summaries_dir: &Path, signature: &str) -> TrainingResult<Self> {
        let root = summaries_dir.join(signature);
        let images_dir = root.join("images");
        std::fs::create_dir_all(&images_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(root.join("scalars.jsonl"))?;
        Ok(Self { images_dir, scalars: BufWriter::new(file) })
    }
}

impl SummarySink for DirectorySink {
    fn scalar(&mut self, step: u64, tag: &str, value: f32) -> TrainingResult<()> {
        let record = ScalarRecord { step, tag, value };
        serde_json::to_writer(&mut self.scalars, &record)?;
        self.scalars.write_all(b"\n")?;
        self.scalars.flush()?;
        Ok(())
    }

    fn image(&mut self, step: u64, tag: &str, image: &ImageTensor) -> TrainingResult<()> {
        let path = self.images_dir.join(format!("{tag}_step{step}.png"));
        image.to_rgb8().save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_signature_format() {
        assert_eq!(run_signature(120, 16, 10000), "data120_bch16_ep10000");
    }

    #[test]
    fn test_directory_sink_writes_scalars_and_images() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::create(temp.path(), "data2_bch1_ep1").unwrap();

        sink.scalar(0, "loss_total", 0.5).unwrap();
        sink.scalar(10, "loss_total", 0.25).unwrap();
        sink.image(0, "out_0", &ImageTensor::zeros(4, 4)).unwrap();

        let scalars =
            std::fs::read_to_string(temp.path().join("data2_bch1_ep1/scalars.jsonl")).unwrap();
        assert_eq!(scalars.lines().count(), 2);
        assert!(scalars.lines().next().unwrap().contains("\"loss_total\""));
        assert!(temp.path().join("data2_bch1_ep1/images/out_0_step0.png").exists());
    }
}
