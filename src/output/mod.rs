//! Output module for run reports and checkpoint statistics
//!
//! This module handles:
//! - Summarizing a finished run
//! - Reading checkpoint statistics for the `--stats` command

mod report;
pub mod stats;

pub use report::RunReport;
pub use stats::{load_statistics, print_statistics, ProgressStatistics};
