//! Storage module for persisting harvest checkpoints
//!
//! This module handles all durable state for a harvest, including:
//! - The progress document (completed, failed, last id, last run)
//! - The dataset document (id -> name)
//! - The failed-only export written at the end of a run
//! - Tolerant loading, so a damaged file never stops a run

mod json;
mod traits;

pub use json::{failed_export_path, JsonCheckpointStore};
pub use traits::{CheckpointStore, DocumentStatus, LoadedCheckpoint, StorageError, StorageResult};

use crate::config::OutputConfig;
use crate::state::{Dataset, ProgressState};
use crate::HarvestError;
use std::sync::Arc;

/// Opens the checkpoint store named in the output config
///
/// Parent directories are created here; failing to create them is a fatal
/// startup error.
///
/// # Returns
///
/// * `Ok(JsonCheckpointStore)` - Store ready for load and save
/// * `Err(HarvestError)` - Output directories could not be created
pub fn open_store(config: &OutputConfig) -> Result<JsonCheckpointStore, HarvestError> {
    let store = JsonCheckpointStore::from_config(config);
    store
        .prepare()
        .map_err(|e| HarvestError::Startup(format!("cannot create output directory: {}", e)))?;
    Ok(store)
}

/// Writes a checkpoint snapshot on the blocking thread pool
///
/// Callers that must serialize flushes keep holding their state lock while
/// awaiting this.
pub async fn save_in_background(
    store: Arc<dyn CheckpointStore>,
    progress: ProgressState,
    dataset: Dataset,
) -> Result<(), HarvestError> {
    tokio::task::spawn_blocking(move || store.save(&progress, &dataset)).await??;
    Ok(())
}
