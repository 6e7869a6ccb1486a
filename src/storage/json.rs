//! JSON file checkpoint backend
//!
//! Progress and dataset are two pretty-printed JSON documents. Every save
//! rewrites a whole document through a sibling temp file and a rename, so a
//! reader never sees a half-written file.

use crate::config::OutputConfig;
use crate::state::{Dataset, ProgressState};
use crate::storage::traits::{
    CheckpointStore, DocumentStatus, LoadedCheckpoint, StorageError, StorageResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Checkpoint store backed by JSON files
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    progress_path: PathBuf,
    dataset_path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(progress_path: impl Into<PathBuf>, dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            progress_path: progress_path.into(),
            dataset_path: dataset_path.into(),
        }
    }

    /// Creates a store for the paths named in the output config
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.progress_path, &config.dataset_path)
    }

    pub fn progress_path(&self) -> &Path {
        &self.progress_path
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    /// Where the failed-only export goes: `videos.json` -> `videos_failed.json`
    pub fn failed_export_path(&self) -> PathBuf {
        failed_export_path(&self.dataset_path)
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn prepare(&self) -> StorageResult<()> {
        for path in [&self.progress_path, &self.dataset_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn load(&self) -> StorageResult<LoadedCheckpoint> {
        let (progress, progress_status) =
            read_document::<ProgressState>(&self.progress_path, "Progress file")?;

        match progress_status {
            DocumentStatus::Loaded => {
                tracing::info!(
                    "Loaded progress: {} completed, {} failed",
                    progress.completed.len(),
                    progress.failed.len()
                );
                tracing::info!("Resuming from ID {}", progress.last_id);
            }
            DocumentStatus::Corrupt => {
                tracing::warn!("Progress file is corrupted, starting fresh");
            }
            DocumentStatus::Missing => {
                tracing::debug!("No progress file at {}", self.progress_path.display());
            }
        }

        let (dataset, dataset_status) =
            read_document::<Dataset>(&self.dataset_path, "Data file")?;

        match dataset_status {
            DocumentStatus::Loaded => {
                tracing::info!("Loaded {} existing entries from main data file", dataset.len());
            }
            DocumentStatus::Corrupt => {
                tracing::warn!("Data file is corrupted, but will use progress data if available");
            }
            DocumentStatus::Missing => {
                tracing::debug!("No data file at {}", self.dataset_path.display());
            }
        }

        Ok(LoadedCheckpoint {
            progress,
            progress_status,
            dataset,
            dataset_status,
        })
    }

    fn save(&self, progress: &ProgressState, dataset: &Dataset) -> StorageResult<()> {
        write_document(&self.progress_path, progress)?;
        write_document(&self.dataset_path, dataset)?;
        tracing::debug!(
            completed = progress.completed.len(),
            failed = progress.failed.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    fn export_failed(&self, failed: &BTreeMap<u32, String>) -> StorageResult<Option<PathBuf>> {
        if failed.is_empty() {
            return Ok(None);
        }

        let path = self.failed_export_path();
        write_document(&path, failed)?;
        Ok(Some(path))
    }
}

/// Derives the failed-export path from the dataset path
pub fn failed_export_path(dataset_path: &Path) -> PathBuf {
    let stem = dataset_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    let ext = dataset_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("json");
    dataset_path.with_file_name(format!("{stem}_failed.{ext}"))
}

/// Reads a JSON document, degrading to defaults when missing or malformed
fn read_document<T>(path: &Path, label: &str) -> StorageResult<(T, DocumentStatus)>
where
    T: DeserializeOwned + Default,
{
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok((T::default(), DocumentStatus::Missing));
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            // Not valid UTF-8
            tracing::warn!("{} {} is not valid UTF-8: {}", label, path.display(), e);
            return Ok((T::default(), DocumentStatus::Corrupt));
        }
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => Ok((value, DocumentStatus::Loaded)),
        Err(e) => {
            tracing::warn!("{} {} could not be parsed: {}", label, path.display(), e);
            Ok((T::default(), DocumentStatus::Corrupt))
        }
    }
}

/// Serializes `value` and atomically replaces `path` with it
fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');

    let temp_path = temp_path_for(path);
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::write(&temp_path, &bytes).map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        io_err(e)
    })
}

/// Sibling temp file used for atomic replacement
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("checkpoint");
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}
