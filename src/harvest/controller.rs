//! Run controller - main harvest orchestration logic
//!
//! This module drives one run from start to finish:
//! - Loading and reconciling the checkpoint
//! - Cooling down when the previous run ended moments ago
//! - Building the work list from the ids still missing
//! - Supervising the worker pool until the queue drains or the run is cancelled
//! - Final persistence and the run report

use crate::config::Config;
use crate::harvest::fetcher::{HttpFetcher, ItemFetcher};
use crate::harvest::pacing::{random_delay, sleep_or_cancel};
use crate::harvest::queue::WorkQueue;
use crate::harvest::worker::{spawn_workers, WorkerContext, WorkerSettings};
use crate::output::RunReport;
use crate::state::HarvestState;
use crate::storage::{open_store, save_in_background, CheckpointStore};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Stages of a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Load,
    Reconcile,
    Cooldown,
    BuildWorkList,
    RunPool,
    Drain,
    FinalPersist,
    Report,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Load => "load",
            RunStage::Reconcile => "reconcile",
            RunStage::Cooldown => "cooldown",
            RunStage::BuildWorkList => "build work list",
            RunStage::RunPool => "run pool",
            RunStage::Drain => "drain",
            RunStage::FinalPersist => "final persist",
            RunStage::Report => "report",
        };
        write!(f, "{}", name)
    }
}

/// Main harvest structure
pub struct Harvester {
    config: Arc<Config>,
    store: Arc<dyn CheckpointStore>,
    fetcher: Arc<dyn ItemFetcher>,
    cancel: CancellationToken,
}

impl Harvester {
    /// Creates a harvester with the JSON store and the HTTP fetcher
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Output directories exist and the client is built
    /// * `Err(HarvestError)` - A fatal startup fault; no request was made
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let store = open_store(&config.output)?;
        let fetcher = HttpFetcher::from_config(&config)?;
        Ok(Self::with_parts(config, Arc::new(store), Arc::new(fetcher)))
    }

    /// Creates a harvester from explicit collaborators
    pub fn with_parts(
        config: Config,
        store: Arc<dyn CheckpointStore>,
        fetcher: Arc<dyn ItemFetcher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that interrupts the run when cancelled
    ///
    /// An interrupted run still saves its progress before returning.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the harvest to completion or interruption
    pub async fn run(&self) -> Result<RunReport, HarvestError> {
        let started = Instant::now();
        let harvest = &self.config.harvest;

        enter(RunStage::Load);
        let loaded = self.store.load()?;

        enter(RunStage::Reconcile);
        let state = HarvestState::reconcile(loaded.progress, loaded.dataset, harvest.save_every);

        if let Some(age) = recent_run_age(
            state.progress().last_run,
            Utc::now(),
            harvest.cooldown_threshold(),
        ) {
            enter(RunStage::Cooldown);
            let pause = random_delay(harvest.cooldown_min_ms, harvest.cooldown_max_ms);
            tracing::info!(
                "Last run was {:.0}s ago. Cooling down for {:.1}s",
                age.as_secs_f64(),
                pause.as_secs_f64()
            );
            if !sleep_or_cancel(&self.cancel, pause).await {
                tracing::info!("Interrupted during cooldown");
                return Ok(self.report(&state, started, true, None));
            }
        }

        enter(RunStage::BuildWorkList);
        let remaining = state.progress().remaining_ids(harvest.id_range());
        let queue = if harvest.shuffle {
            WorkQueue::shuffled(remaining)
        } else {
            WorkQueue::new(remaining)
        };
        tracing::info!("Added {} IDs to queue", queue.total());

        enter(RunStage::RunPool);
        let state = Arc::new(Mutex::new(state));
        let workers = self.cancel.child_token();
        let context = Arc::new(WorkerContext {
            queue: queue.clone(),
            fetcher: Arc::clone(&self.fetcher),
            state: Arc::clone(&state),
            store: Arc::clone(&self.store),
            settings: WorkerSettings::from_config(harvest),
            cancel: workers.clone(),
        });
        let handles = spawn_workers(context, harvest.max_concurrent_requests as usize);

        enter(RunStage::Drain);
        let interrupted = tokio::select! {
            _ = queue.join() => false,
            _ = self.cancel.cancelled() => true,
        };
        if interrupted {
            tracing::warn!("Interrupted with {} IDs outstanding", queue.pending());
        }

        workers.cancel();
        for (worker, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                let err = HarvestError::Worker {
                    worker,
                    message: e.to_string(),
                };
                tracing::error!("{}", err);
            }
        }

        enter(RunStage::FinalPersist);
        let mut state = state.lock().await;
        state.touch(Utc::now());
        save_in_background(
            Arc::clone(&self.store),
            state.progress().clone(),
            state.dataset().clone(),
        )
        .await?;
        tracing::info!("Progress saved");
        let failed_export = self.store.export_failed(&state.progress().failed)?;

        enter(RunStage::Report);
        Ok(self.report(&state, started, interrupted, failed_export))
    }

    fn report(
        &self,
        state: &HarvestState,
        started: Instant,
        interrupted: bool,
        failed_export: Option<std::path::PathBuf>,
    ) -> RunReport {
        RunReport {
            succeeded: state.progress().completed.len(),
            failed: state.progress().failed.len(),
            total_ids: self.config.harvest.id_range().count(),
            processed: state.processed(),
            elapsed: started.elapsed(),
            interrupted,
            failed_export,
        }
    }
}

fn enter(stage: RunStage) {
    tracing::debug!(%stage, "Entering stage");
}

/// Age of the previous run when it is recent enough to warrant a cooldown
///
/// A timestamp in the future counts as age zero.
pub fn recent_run_age(
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Option<Duration> {
    let last_run = last_run?;
    let age = (now - last_run).to_std().unwrap_or(Duration::ZERO);
    (age < threshold).then_some(age)
}
