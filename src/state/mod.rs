//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `FetchResult`: terminal outcome of fetching one identifier
//! - `ProgressState`: the durable checkpoint (completed, failed, last id, last run)
//! - `HarvestState`: the in-memory aggregate workers update during a run

mod fetch_result;
mod harvest_state;
mod progress;

// Re-export main types
pub use fetch_result::FetchResult;
pub use harvest_state::{Applied, HarvestState};
pub use progress::{parse_timestamp, Dataset, ProgressState};
