//! In-memory aggregate shared by the worker pool
//!
//! Workers hold this behind one async mutex; every read-modify-write of the
//! progress maps, the dataset and the success counter goes through it.

use crate::state::progress::{Dataset, ProgressState};
use crate::state::FetchResult;
use chrono::{DateTime, Utc};

/// What applying one fetch result changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A success was recorded; `flush_due` is set on every Nth success
    Success { flush_due: bool },

    /// A failure was recorded
    Failure,

    /// The identifier already completed, nothing changed
    Ignored,
}

/// Progress plus dataset plus run counters
#[derive(Debug, Clone)]
pub struct HarvestState {
    progress: ProgressState,
    dataset: Dataset,
    save_every: u32,
    successes_since_save: u32,
    processed: u64,
}

impl HarvestState {
    /// Builds the run state from what was loaded at startup
    ///
    /// Dataset entries are merged into `completed` (dataset names win on
    /// conflict), the failed map is cleaned of completed ids, and the
    /// in-memory dataset becomes a copy of `completed`.
    pub fn reconcile(mut progress: ProgressState, dataset: Dataset, save_every: u32) -> Self {
        let merged = progress.merge_dataset(&dataset);
        let dropped = progress.enforce_partition();

        if merged > 0 {
            tracing::info!("Merged {} entries from the dataset into progress", merged);
        }
        if dropped > 0 {
            tracing::debug!("Dropped {} stale failed entries", dropped);
        }

        let dataset = progress.completed.clone();

        Self {
            progress,
            dataset,
            save_every: save_every.max(1),
            successes_since_save: 0,
            processed: 0,
        }
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn is_completed(&self, id: u32) -> bool {
        self.progress.is_completed(id)
    }

    /// Fetches finished during this run
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Applies one terminal fetch outcome
    ///
    /// On the checkpoint cadence the low-water mark is advanced to the id
    /// that triggered it.
    pub fn apply(&mut self, result: FetchResult) -> Applied {
        match result {
            FetchResult::Success { id, name } => {
                self.processed += 1;
                self.dataset.insert(id, name.clone());
                self.progress.record_success(id, name);

                self.successes_since_save += 1;
                let flush_due = self.successes_since_save >= self.save_every;
                if flush_due {
                    self.successes_since_save = 0;
                    self.progress.advance_last_id(id);
                }
                Applied::Success { flush_due }
            }
            FetchResult::Failure { id, reason } => {
                if self.progress.record_failure(id, reason) {
                    self.processed += 1;
                    Applied::Failure
                } else {
                    Applied::Ignored
                }
            }
        }
    }

    /// Stamps the checkpoint time before a save
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.progress.last_run = Some(now);
    }
}
