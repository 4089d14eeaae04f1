use crate::error::{TrainingError, TrainingResult};
use crate::optim::AdamState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The only state that must survive a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    pub global_step: u64,
    pub params: Vec<f32>,
    pub optimizer: AdamState,
}

/// On-disk checkpoint snapshot: immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub saved_at: DateTime<Utc>,
    pub state: TrainingState,
}

/// Probe used during pruning so retention does not deserialize parameter
/// vectors.
#[derive(Deserialize)]
struct SavedAtProbe {
    saved_at: DateTime<Utc>,
}

/// Persists, lists and restores step-tagged training state snapshots.
///
/// Retention keeps at most `max_to_keep` checkpoints by count, but the
/// first snapshot of each elapsed wall-clock hour is retained regardless
/// of the cap.
pub struct CheckpointManager {
    dir: PathBuf,
    save_name: String,
    max_to_keep: usize,
    keep_every: Duration,
}

impl CheckpointManager {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            save_name: "lucent.model".to_string(),
            max_to_keep: 100,
            keep_every: Duration::hours(1),
        }
    }

    pub fn with_retention(mut self, max_to_keep: usize, keep_every_secs: i64) -> Self {
        self.max_to_keep = max_to_keep;
        self.keep_every = Duration::seconds(keep_every_secs);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checkpoint names in step-ascending order. Absent directories and
    /// unrecognizable entries yield an empty or shorter list, never an
    /// error.
    pub fn list(&self) -> TrainingResult<Vec<String>> {
        let mut entries = self.scan()?;
        entries.sort_by_key(|(step, _)| *step);
        Ok(entries.into_iter().map(|(_, name)| name).collect())
    }

    /// Write a new snapshot tagged with `state.global_step`, creating the
    /// checkpoint directory if absent, then apply the retention policy.
    pub fn save(&self, state: &TrainingState) -> TrainingResult<String> {
        std::fs::create_dir_all(&self.dir)?;
        let name = format!("{}-{}", self.save_name, state.global_step);
        let record = CheckpointRecord { saved_at: Utc::now(), state: state.clone() };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(self.path_for(&name), json)?;
        self.prune()?;
        Ok(name)
    }

    /// Restore the full training state from a named checkpoint.
    pub fn load(&self, name: &str) -> TrainingResult<TrainingState> {
        let path = self.path_for(name);
        let bytes = std::fs::read(&path).map_err(|e| {
            TrainingError::Checkpoint(format!("cannot read checkpoint {name}: {e}"))
        })?;
        let record: CheckpointRecord = serde_json::from_slice(&bytes)?;
        Ok(record.state)
    }

    /// Apply the retention policy: newest `max_to_keep` by step, plus the
    /// first snapshot of each elapsed hour bucket measured from the oldest
    /// retained snapshot.
    pub fn prune(&self) -> TrainingResult<()> {
        let mut entries = self.scan()?;
        if entries.len() <= self.max_to_keep {
            return Ok(());
        }
        entries.sort_by_key(|(step, _)| *step);

        let mut timed = Vec::with_capacity(entries.len());
        for (step, name) in entries {
            let bytes = std::fs::read(self.path_for(&name))?;
            let probe: SavedAtProbe = match serde_json::from_slice(&bytes) {
                Ok(p) => p,
                Err(_) => continue,
            };
            timed.push((step, name, probe.saved_at));
        }
        if timed.is_empty() {
            return Ok(());
        }

        let origin = timed.iter().map(|(_, _, at)| *at).min().unwrap_or_else(Utc::now);
        let bucket_len = self.keep_every.num_seconds().max(1);

        let mut keep: HashSet<String> = HashSet::new();
        let mut seen_buckets: HashSet<i64> = HashSet::new();
        for (_, name, saved_at) in &timed {
            let bucket = (*saved_at - origin).num_seconds() / bucket_len;
            if seen_buckets.insert(bucket) {
                keep.insert(name.clone());
            }
        }
        for (_, name, _) in timed.iter().rev().take(self.max_to_keep) {
            keep.insert(name.clone());
        }

        for (_, name, _) in &timed {
            if !keep.contains(name) {
                std::fs::remove_file(self.path_for(name))?;
            }
        }
        Ok(())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn scan(&self) -> TrainingResult<Vec<(u64, String)>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}-", self.save_name);
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = file_name.strip_suffix(".json") else { continue };
            let Some(step_str) = stem.strip_prefix(&prefix) else { continue };
            let Ok(step) = step_str.parse::<u64>() else { continue };
            entries.push((step, stem.to_string()));
        }
        Ok(entries)
    }
}
