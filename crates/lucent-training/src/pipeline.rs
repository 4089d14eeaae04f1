use crate::error::{TrainingError, TrainingResult};
use crate::tensor::{joint_random_crop, DecodeKind, ImageTensor};
use anyhow::anyhow;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread;

/// Bounded decode parallelism per batch.
pub const DECODE_WORKERS: usize = 4;

/// A stack of `batch_size` decoded and jointly cropped sample pairs.
#[derive(Debug, Clone)]
pub struct Batch {
    pub input: Vec<ImageTensor>,
    pub ground_truth: Vec<ImageTensor>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }
}

/// Lazy, shuffled, repeated, batched sequence of sample pairs.
///
/// The path list is shuffled once with a whole-dataset permutation at
/// construction, then logically repeated `epoch_count` times; a trailing
/// partial batch per epoch is dropped. Decode and crop run on a small
/// worker pool off the consumer thread, with exactly one batch prefetched
/// ahead of consumption.
///
/// The sequence is consumed once per run. A resumed run rebuilds the
/// pipeline with a fresh permutation, so it does not replay the exact
/// batch order the interrupted run would have seen.
pub struct Pipeline {
    receiver: Receiver<TrainingResult<Batch>>,
    total_batches: usize,
    _producer: thread::JoinHandle<()>,
}

impl Pipeline {
    pub fn build(
        pairs: Vec<(PathBuf, PathBuf)>,
        decode_kind: DecodeKind,
        crop_size: usize,
        batch_size: usize,
        epoch_count: usize,
    ) -> TrainingResult<Self> {
        if batch_size == 0 {
            return Err(TrainingError::Configuration("batch_size must be >= 1".to_string()));
        }
        if pairs.len() < batch_size {
            return Err(TrainingError::Configuration(format!(
                "batch size must be smaller than the dataset (batch size = {}, number of data = {})",
                batch_size,
                pairs.len()
            )));
        }

        let batches_per_epoch = pairs.len() / batch_size;
        let total_batches = epoch_count * batches_per_epoch;

        let mut order: Vec<usize> = (0..pairs.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        // Depth-1 buffer: the producer stays at most one finished batch
        // ahead of the consumer.
        let (sender, receiver) = sync_channel::<TrainingResult<Batch>>(1);

        let producer = thread::spawn(move || {
            for _ in 0..epoch_count {
                for chunk in order.chunks_exact(batch_size) {
                    let batch = decode_batch(&pairs, chunk, decode_kind, crop_size);
                    let failed = batch.is_err();
                    if sender.send(batch).is_err() {
                        // Consumer dropped the pipeline.
                        return;
                    }
                    if failed {
                        return;
                    }
                }
            }
        });

        Ok(Self { receiver, total_batches, _producer: producer })
    }

    /// Deterministic total batch count: `epoch_count * (len / batch_size)`.
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// Block until the next prefetched batch is ready; `None` once the
    /// repeated sequence is exhausted.
    pub fn next_batch(&mut self) -> Option<TrainingResult<Batch>> {
        self.receiver.recv().ok()
    }
}

impl Iterator for Pipeline {
    type Item = TrainingResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

fn decode_batch(
    pairs: &[(PathBuf, PathBuf)],
    indices: &[usize],
    decode_kind: DecodeKind,
    crop_size: usize,
) -> TrainingResult<Batch> {
    let per_worker = indices.len().div_ceil(DECODE_WORKERS);
    let samples: Vec<TrainingResult<(ImageTensor, ImageTensor)>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(DECODE_WORKERS);
        for part in indices.chunks(per_worker) {
            handles.push(scope.spawn(move || {
                part.iter()
                    .map(|&idx| {
                        let (in_path, gt_path) = &pairs[idx];
                        let input = ImageTensor::decode(in_path, decode_kind)?;
                        let target = ImageTensor::decode(gt_path, decode_kind)?;
                        joint_random_crop(&input, &target, crop_size, &mut rand::thread_rng())
                    })
                    .collect::<Vec<_>>()
            }));
        }
        let mut collected = Vec::with_capacity(indices.len());
        for handle in handles {
            match handle.join() {
                Ok(part) => collected.extend(part),
                Err(_) => collected.push(Err(TrainingError::Other(anyhow!("decode worker panicked")))),
            }
        }
        collected
    });

    let mut input = Vec::with_capacity(indices.len());
    let mut ground_truth = Vec::with_capacity(indices.len());
    for sample in samples {
        let (img_in, img_gt) = sample?;
        input.push(img_in);
        ground_truth.push(img_gt);
    }
    Ok(Batch { input, ground_truth })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write a PNG whose pixels encode their own coordinates, shared
    /// between input and ground truth so crop alignment is observable.
    fn write_marker_png(path: &Path, height: u32, width: u32) {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([y as u8, x as u8, (x ^ y) as u8])
        });
        img.save(path).unwrap();
    }

    fn make_pairs(dir: &Path, count: usize, height: u32, width: u32) -> Vec<(PathBuf, PathBuf)> {
        let mut pairs = Vec::new();
        for i in 0..count {
            let in_path = dir.join(format!("in_{i}.png"));
            let gt_path = dir.join(format!("gt_{i}.png"));
            write_marker_png(&in_path, height, width);
            write_marker_png(&gt_path, height, width);
            pairs.push((in_path, gt_path));
        }
        pairs
    }

    #[test]
    fn test_total_batch_count_law() {
        let temp = TempDir::new().unwrap();
        let pairs = make_pairs(temp.path(), 5, 16, 16);

        // 5 pairs, batch 2 => 2 batches per epoch, trailing pair dropped.
        let pipeline = Pipeline::build(pairs, DecodeKind::Standard, 8, 2, 3).unwrap();
        assert_eq!(pipeline.total_batches(), 6);

        let batches: Vec<_> = pipeline.map(Result::unwrap).collect();
        assert_eq!(batches.len(), 6);
        for batch in &batches {
            assert_eq!(batch.len(), 2);
            for img in &batch.input {
                assert_eq!((img.height, img.width), (8, 8));
            }
        }
    }

    #[test]
    fn test_joint_crop_alignment_through_pipeline() {
        let temp = TempDir::new().unwrap();
        let pairs = make_pairs(temp.path(), 4, 24, 24);

        let pipeline = Pipeline::build(pairs, DecodeKind::Standard, 12, 4, 2).unwrap();
        for batch in pipeline {
            let batch = batch.unwrap();
            for (img_in, img_gt) in batch.input.iter().zip(&batch.ground_truth) {
                // Identical marker sources: equal crops imply equal origins.
                assert_eq!(img_in, img_gt);
            }
        }
    }

    #[test]
    fn test_build_rejects_batch_larger_than_dataset() {
        let temp = TempDir::new().unwrap();
        let pairs = make_pairs(temp.path(), 2, 16, 16);
        let result = Pipeline::build(pairs, DecodeKind::Standard, 8, 4, 1);
        assert!(matches!(result, Err(TrainingError::Configuration(_))));
    }

    #[test]
    fn test_undersized_source_surfaces_as_error() {
        let temp = TempDir::new().unwrap();
        let pairs = make_pairs(temp.path(), 2, 8, 8);
        let mut pipeline = Pipeline::build(pairs, DecodeKind::Standard, 16, 2, 1).unwrap();
        let first = pipeline.next_batch().unwrap();
        assert!(first.is_err());
    }
}
