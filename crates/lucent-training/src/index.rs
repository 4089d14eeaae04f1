use crate::error::{TrainingError, TrainingResult};
use crate::tensor::DecodeKind;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// List image files directly under `dir` in a stable (sorted) order.
///
/// A missing directory is treated as an empty listing; whether that is
/// fatal depends on the split it belongs to.
pub fn list_image_paths(dir: &Path) -> TrainingResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| TrainingError::Configuration(format!(
            "failed to list {}: {e}",
            dir.display()
        )))?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Resolved and validated path lists for the train and test splits.
///
/// The first training input's extension governs the decode strategy for
/// the whole run; mixed-extension datasets are unsupported.
#[derive(Debug, Clone)]
pub struct DatasetIndex {
    pub train_inputs: Vec<PathBuf>,
    pub train_targets: Vec<PathBuf>,
    pub test_inputs: Vec<PathBuf>,
    pub test_targets: Vec<PathBuf>,
    pub file_extension: String,
}

impl DatasetIndex {
    /// Discover paired splits under `data_root` and validate them against
    /// the batch size. Runs before any pipeline or session resource is
    /// allocated.
    pub fn discover(data_root: &Path, batch_size: usize) -> TrainingResult<Self> {
        let train_in = data_root.join("train").join("input");
        let train_gt = data_root.join("train").join("groundtruth");
        let test_in = data_root.join("test").join("input");
        let test_gt = data_root.join("test").join("groundtruth");

        let train_inputs = list_image_paths(&train_in)?;
        let train_targets = list_image_paths(&train_gt)?;
        if train_inputs.is_empty() || train_targets.is_empty() {
            return Err(TrainingError::Configuration(format!(
                "no training data found in {} or {}",
                train_in.display(),
                train_gt.display()
            )));
        }
        if train_inputs.len() != train_targets.len() {
            return Err(TrainingError::Configuration(format!(
                "{} and {} should have the same number of input data ({} vs {})",
                train_in.display(),
                train_gt.display(),
                train_inputs.len(),
                train_targets.len()
            )));
        }
        if train_inputs.len() < batch_size {
            return Err(TrainingError::Configuration(format!(
                "batch size must be smaller than the dataset (batch size = {}, number of training data = {})",
                batch_size,
                train_inputs.len()
            )));
        }

        let mut test_inputs = list_image_paths(&test_in)?;
        let mut test_targets = list_image_paths(&test_gt)?;
        if test_inputs.is_empty() || test_targets.is_empty() {
            warn!(
                "no test data found in {} or {}; test evaluation disabled",
                test_in.display(),
                test_gt.display()
            );
            test_inputs.clear();
            test_targets.clear();
        } else if test_inputs.len() != test_targets.len() {
            return Err(TrainingError::Configuration(format!(
                "{} and {} should have the same number of input data ({} vs {})",
                test_in.display(),
                test_gt.display(),
                test_inputs.len(),
                test_targets.len()
            )));
        }

        let file_extension = train_inputs[0]
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        Ok(Self { train_inputs, train_targets, test_inputs, test_targets, file_extension })
    }

    pub fn has_test_data(&self) -> bool {
        !self.test_inputs.is_empty()
    }

    /// Resolve the single decode strategy for the run, or fail if the
    /// inferred extension is unsupported.
    pub fn decode_kind(&self) -> TrainingResult<DecodeKind> {
        DecodeKind::from_extension(&self.file_extension).ok_or_else(|| {
            TrainingError::Configuration(format!(
                "unhandled file extension '{}'; should be one of ['jpg', 'jpeg', 'png', 'bmp', 'exr']",
                self.file_extension
            ))
        })
    }

    pub fn train_pairs(&self) -> Vec<(PathBuf, PathBuf)> {
        self.train_inputs.iter().cloned().zip(self.train_targets.iter().cloned()).collect()
    }

    pub fn test_pairs(&self) -> Vec<(PathBuf, PathBuf)> {
        self.test_inputs.iter().cloned().zip(self.test_targets.iter().cloned()).collect()
    }

    pub fn batches_per_epoch(&self, batch_size: usize) -> usize {
        self.train_inputs.len() / batch_size
    }
}
