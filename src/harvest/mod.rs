//! Harvest module - the fetch pipeline
//!
//! # Components
//!
//! - `fetcher`: one identifier to one terminal outcome, with bounded retries
//! - `payload`: classification of a single response
//! - `backoff`: retry delays and the retry ceiling
//! - `identity`: per-request header sets
//! - `queue`: the backlog of pending identifiers
//! - `worker`: the pool that drains the backlog
//! - `controller`: startup, supervision, final persistence

pub mod backoff;
pub mod controller;
pub mod fetcher;
pub mod identity;
pub mod pacing;
pub mod payload;
pub mod queue;
pub mod worker;

pub use backoff::{BackoffPolicy, MAX_RETRIES_REASON};
pub use controller::{recent_run_age, Harvester, RunStage};
pub use fetcher::{build_http_client, HttpFetcher, ItemFetcher};
pub use identity::{RequestDecorator, RotatingIdentity};
pub use payload::{classify_payload, classify_response, Attempt};
pub use queue::{QueuedId, WorkQueue};
pub use worker::{spawn_workers, WorkerContext, WorkerSettings};
