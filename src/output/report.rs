//! End-of-run report

use std::path::PathBuf;
use std::time::Duration;

/// Summary of one harvest run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Identifiers in `completed` after the run
    pub succeeded: usize,

    /// Identifiers in `failed` after the run
    pub failed: usize,

    /// Size of the configured identifier range
    pub total_ids: usize,

    /// Terminal outcomes recorded during this run
    pub processed: u64,

    /// Wall time from startup to final flush
    pub elapsed: Duration,

    /// The run was cancelled before the queue drained
    pub interrupted: bool,

    /// Where the failed-only export was written, if anything failed
    pub failed_export: Option<PathBuf>,
}

impl RunReport {
    /// Outcomes per minute over the whole run
    pub fn requests_per_minute(&self) -> f64 {
        let minutes = self.elapsed.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.processed as f64 / minutes
        } else {
            0.0
        }
    }

    /// Emits the summary as log lines
    pub fn log_summary(&self) {
        if self.interrupted {
            tracing::warn!("Run interrupted before the queue drained");
        }

        tracing::info!(
            "Scraping complete. Total items: {} of {}",
            self.succeeded,
            self.total_ids
        );
        tracing::info!("Failed IDs: {}", self.failed);
        tracing::info!(
            "Processed {} IDs in {:.1}s ({:.1} requests/min)",
            self.processed,
            self.elapsed.as_secs_f64(),
            self.requests_per_minute()
        );

        if let Some(path) = &self.failed_export {
            tracing::info!("Failed IDs saved to {}", path.display());
        }
    }
}
