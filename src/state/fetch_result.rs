//! Terminal outcome of fetching one identifier

use std::fmt;

/// Result of fetching one identifier
///
/// Retries happen inside the fetcher and never surface here. Every
/// identifier handed to a fetcher yields exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The record was retrieved and its name extracted
    Success { id: u32, name: String },

    /// The record could not be retrieved in this run
    Failure { id: u32, reason: String },
}

impl FetchResult {
    /// The identifier this outcome belongs to
    pub fn id(&self) -> u32 {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => *id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { id, name } => write!(f, "ID {}: '{}'", id, name),
            Self::Failure { id, reason } => write!(f, "ID {} failed: {}", id, reason),
        }
    }
}
