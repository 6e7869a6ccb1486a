//! Worker pool
//!
//! Each worker repeatedly takes an id from the shared queue, fetches it,
//! folds the result into the shared state, flushes a checkpoint on the
//! configured cadence and paces itself before taking the next id.

use crate::config::HarvestConfig;
use crate::harvest::fetcher::ItemFetcher;
use crate::harvest::pacing::{random_delay, sleep_or_cancel};
use crate::harvest::queue::{QueuedId, WorkQueue};
use crate::state::{Applied, HarvestState};
use crate::storage::{save_in_background, CheckpointStore};
use crate::HarvestError;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::ops::RangeInclusive;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-worker timing and reporting settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub recovery: Duration,
    pub id_range: RangeInclusive<u32>,
}

impl WorkerSettings {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
            recovery: config.worker_recovery(),
            id_range: config.id_range(),
        }
    }
}

/// Everything a worker shares with its siblings
pub struct WorkerContext {
    pub queue: WorkQueue,
    pub fetcher: Arc<dyn ItemFetcher>,
    pub state: Arc<Mutex<HarvestState>>,
    pub store: Arc<dyn CheckpointStore>,
    pub settings: WorkerSettings,
    pub cancel: CancellationToken,
}

/// Spawns `count` workers over one shared context
pub fn spawn_workers(context: Arc<WorkerContext>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let context = Arc::clone(&context);
            tokio::spawn(async move { run_worker(worker, context).await })
        })
        .collect()
}

/// Drains the queue until it is empty or the run is cancelled
pub async fn run_worker(worker: usize, context: Arc<WorkerContext>) {
    tracing::debug!(worker, "Worker started");

    while !context.cancel.is_cancelled() {
        let Some(item) = context.queue.next() else {
            break;
        };

        let id = item.id;
        let fault = match AssertUnwindSafe(process(&context, item))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(HarvestError::Worker {
                worker,
                message: panic_message(panic.as_ref()),
            }),
        };

        if let Some(e) = fault {
            tracing::error!(worker, id, "Worker error: {}", e);
            if !sleep_or_cancel(&context.cancel, context.settings.recovery).await {
                break;
            }
        }
    }

    tracing::debug!(worker, "Worker stopped");
}

/// Handles one dequeued id; the item is acknowledged when this returns
async fn process(context: &WorkerContext, item: QueuedId) -> Result<(), HarvestError> {
    let id = item.id;

    if context.state.lock().await.is_completed(id) {
        tracing::debug!(id, "ID {} already completed, skipping", id);
        return Ok(());
    }

    let result = tokio::select! {
        result = context.fetcher.fetch(id) => result,
        _ = context.cancel.cancelled() => {
            tracing::debug!(id, "ID {} abandoned on shutdown", id);
            return Ok(());
        }
    };

    {
        let mut state = context.state.lock().await;
        if let Applied::Success { flush_due: true } = state.apply(result) {
            state.touch(Utc::now());
            save_in_background(
                Arc::clone(&context.store),
                state.progress().clone(),
                state.dataset().clone(),
            )
            .await?;

            let total = context.settings.id_range.clone().count();
            let done = state.progress().completed_in(context.settings.id_range.clone());
            tracing::info!(
                "Progress: {}/{} ({:.1}%)",
                done,
                total,
                percent(done, total)
            );
        }
    }

    let pause = random_delay(context.settings.min_delay_ms, context.settings.max_delay_ms);
    sleep_or_cancel(&context.cancel, pause).await;

    drop(item);
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}
