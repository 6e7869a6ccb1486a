//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::state::{Dataset, ProgressState};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// How a document looked when it was loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    /// No file on disk, defaults used
    Missing,

    /// File parsed successfully
    Loaded,

    /// File present but unreadable as JSON, defaults used
    Corrupt,
}

/// Everything read from a checkpoint backend at startup
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub progress: ProgressState,
    pub progress_status: DocumentStatus,
    pub dataset: Dataset,
    pub dataset_status: DocumentStatus,
}

/// Trait for checkpoint backend implementations
///
/// Implementations must tolerate missing and malformed documents on load:
/// either degrades to empty state for that document only. Only I/O
/// failures other than "not found" are reported as errors.
pub trait CheckpointStore: Send + Sync {
    /// Creates whatever the backend needs before the first save
    fn prepare(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Loads the progress document and the dataset
    fn load(&self) -> StorageResult<LoadedCheckpoint>;

    /// Rewrites both documents with the given state
    fn save(&self, progress: &ProgressState, dataset: &Dataset) -> StorageResult<()>;

    /// Writes the failed-only export
    ///
    /// Returns the location written, or `None` when `failed` is empty and
    /// nothing was written.
    fn export_failed(&self, failed: &BTreeMap<u32, String>) -> StorageResult<Option<PathBuf>>;
}
