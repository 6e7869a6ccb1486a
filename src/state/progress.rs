//! Durable progress state
//!
//! `ProgressState` is the checkpoint document: which identifiers are done,
//! which failed and why, and when the last save happened. `completed` and
//! `failed` never share a key.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Identifier to record name, the harvested output
pub type Dataset = BTreeMap<u32, String>;

/// Progress checkpoint for a harvest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    /// Identifiers fetched successfully, with their names
    #[serde(default)]
    pub completed: BTreeMap<u32, String>,

    /// Identifiers whose last attempt failed, with the reason
    #[serde(default)]
    pub failed: BTreeMap<u32, String>,

    /// Highest identifier seen at a checkpoint flush
    #[serde(default, alias = "last_id")]
    pub last_id: u32,

    /// When this checkpoint was last written
    #[serde(
        default,
        alias = "last_run",
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_run: Option<DateTime<Utc>>,
}

impl ProgressState {
    pub fn is_completed(&self, id: u32) -> bool {
        self.completed.contains_key(&id)
    }

    /// Records a success; a previous failure for the same id is dropped
    pub fn record_success(&mut self, id: u32, name: String) {
        self.failed.remove(&id);
        self.completed.insert(id, name);
    }

    /// Records a failure unless the id already completed
    ///
    /// Returns false when the failure was ignored.
    pub fn record_failure(&mut self, id: u32, reason: String) -> bool {
        if self.completed.contains_key(&id) {
            return false;
        }
        self.failed.insert(id, reason);
        true
    }

    /// Merges a dataset into `completed`
    ///
    /// Dataset entries win over existing names. Returns the number of
    /// entries that were added or changed.
    pub fn merge_dataset(&mut self, dataset: &Dataset) -> usize {
        let mut changed = 0;
        for (id, name) in dataset {
            if self.completed.get(id) != Some(name) {
                self.completed.insert(*id, name.clone());
                changed += 1;
            }
            self.failed.remove(id);
        }
        changed
    }

    /// Drops failed entries that also appear in `completed`
    ///
    /// Returns how many entries were removed.
    pub fn enforce_partition(&mut self) -> usize {
        let before = self.failed.len();
        let completed = &self.completed;
        self.failed.retain(|id, _| !completed.contains_key(id));
        before - self.failed.len()
    }

    /// Identifiers in `range` that still need fetching, in ascending order
    pub fn remaining_ids(&self, range: RangeInclusive<u32>) -> Vec<u32> {
        range.filter(|id| !self.completed.contains_key(id)).collect()
    }

    /// Number of completed identifiers that fall inside `range`
    pub fn completed_in(&self, range: RangeInclusive<u32>) -> usize {
        self.completed.range(range).count()
    }

    /// Raises the low-water mark to `id` if it is higher
    pub fn advance_last_id(&mut self, id: u32) {
        self.last_id = self.last_id.max(id);
    }
}

/// Parses a checkpoint timestamp
///
/// Accepts RFC 3339 and naive ISO-8601 local times such as
/// `2024-05-01T12:30:00.123456`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
}

/// Deserializes `lastRun`, treating unreadable values as absent
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|value| value.as_str())
        .and_then(parse_timestamp))
}
