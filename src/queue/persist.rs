//! Warm-restart persistence for the queue backlog.
//!
//! Only pending lanes are persisted — in-flight operations cannot be
//! meaningfully resumed. A snapshot carries a schema version and timestamp;
//! restores discard anything stale or from a different schema.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PriorityQueue, QueueEntry};
use crate::operation::Operation;

pub const SCHEMA_VERSION: u32 = 1;

/// Serialized form of the three pending lanes.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub high: Vec<Operation>,
    pub normal: Vec<Operation>,
    pub low: Vec<Operation>,
}

impl QueueSnapshot {
    pub fn capture(queue: &PriorityQueue) -> Self {
        Self {
            version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            high: queue.lane_operations(0),
            normal: queue.lane_operations(1),
            low: queue.lane_operations(2),
        }
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        let age = Utc::now() - self.saved_at;
        age.num_milliseconds() < 0 || age.num_milliseconds() as u128 > max_age.as_millis()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty() && self.low.is_empty()
    }

    /// Rebuild queue entries in lane order. Restored operations have no
    /// outcome waiters; their original submitters are gone.
    pub fn into_entries(self) -> Vec<QueueEntry> {
        self.high
            .into_iter()
            .chain(self.normal)
            .chain(self.low)
            .map(QueueEntry::new)
            .collect()
    }
}

/// Write the current backlog to `path`, creating parent directories as
/// needed.
pub fn save(path: &Path, queue: &PriorityQueue) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let snapshot = QueueSnapshot::capture(queue);
    let json = serde_json::to_string(&snapshot)?;
    std::fs::write(path, json)
}

/// Read a snapshot back, returning `None` when the file is missing,
/// unreadable, from another schema, or older than `max_age`.
pub fn load(path: &Path, max_age: Duration) -> Option<QueueSnapshot> {
    let contents = std::fs::read_to_string(path).ok()?;
    let snapshot: QueueSnapshot = serde_json::from_str(&contents).ok()?;
    if snapshot.version != SCHEMA_VERSION || snapshot.is_stale(max_age) {
        return None;
    }
    Some(snapshot)
}
