//! Statistics generation from the checkpoint files
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::config::HarvestConfig;
use crate::state::HarvestState;
use crate::storage::{CheckpointStore, DocumentStatus};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Checkpoint statistics summary
#[derive(Debug, Clone)]
pub struct ProgressStatistics {
    /// Size of the configured identifier range
    pub total_ids: usize,

    /// Completed identifiers inside the range
    pub completed: usize,

    /// Failed identifiers awaiting a retry
    pub failed: usize,

    /// Identifiers a new run would queue
    pub remaining: usize,

    /// Last identifier recorded at a checkpoint
    pub last_id: u32,

    /// Time of the last checkpoint save
    pub last_run: Option<DateTime<Utc>>,

    /// Failure reasons and how often each occurs
    pub failure_reasons: HashMap<String, usize>,

    /// How the progress document loaded
    pub progress_status: DocumentStatus,

    /// How the dataset document loaded
    pub dataset_status: DocumentStatus,
}

/// Loads statistics from a checkpoint store
///
/// The dataset is reconciled into progress first, so the numbers match
/// what the next run would start from.
///
/// # Arguments
///
/// * `store` - The checkpoint backend to read
/// * `config` - The harvest section, for the identifier range
///
/// # Returns
///
/// * `Ok(ProgressStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to read the checkpoint
pub fn load_statistics(
    store: &dyn CheckpointStore,
    config: &HarvestConfig,
) -> Result<ProgressStatistics, HarvestError> {
    let loaded = store.load()?;
    let state = HarvestState::reconcile(loaded.progress, loaded.dataset, config.save_every);
    let progress = state.progress();

    let mut failure_reasons = HashMap::new();
    for reason in progress.failed.values() {
        *failure_reasons.entry(reason.clone()).or_insert(0) += 1;
    }

    Ok(ProgressStatistics {
        total_ids: config.id_range().count(),
        completed: progress.completed_in(config.id_range()),
        failed: progress.failed.len(),
        remaining: progress.remaining_ids(config.id_range()).len(),
        last_id: progress.last_id,
        last_run: progress.last_run,
        failure_reasons,
        progress_status: loaded.progress_status,
        dataset_status: loaded.dataset_status,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &ProgressStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Checkpoint:");
    println!("  Progress file: {:?}", stats.progress_status);
    println!("  Dataset file: {:?}", stats.dataset_status);
    println!("  Last ID: {}", stats.last_id);
    match stats.last_run {
        Some(last_run) => println!("  Last run: {}", last_run.to_rfc3339()),
        None => println!("  Last run: never"),
    }
    println!();

    let percentage = if stats.total_ids > 0 {
        (stats.completed as f64 / stats.total_ids as f64) * 100.0
    } else {
        0.0
    };

    println!("Overview:");
    println!("  Identifier range: {}", stats.total_ids);
    println!("  Completed: {} ({:.1}%)", stats.completed, percentage);
    println!("  Failed: {}", stats.failed);
    println!("  Remaining: {}", stats.remaining);
    println!();

    if !stats.failure_reasons.is_empty() {
        println!("Failure Reasons:");
        // Sort reasons by count (descending)
        let mut reasons: Vec<_> = stats.failure_reasons.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (reason, count) in reasons {
            println!("  {}: {}", reason, count);
        }
        println!();
    }
}
