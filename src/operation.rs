//! The unit of work flowing through the pipeline.
//!
//! An [`Operation`] is one logical request, independent of how many network
//! attempts it ends up needing. Operations carry a deduplication
//! [`Fingerprint`] derived from the logical name and the salient payload
//! fields, and are archived as [`OperationRecord`]s once terminal.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retry::BreakerStateKind;

/// Request body fields, keyed deterministically. Keys prefixed with `_` are
/// considered transient (UI bookkeeping) and excluded from deduplication.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// Result delivered on an operation's outcome channel.
pub type OperationResult = Result<serde_json::Value, crate::error::PipelineError>;

/// One of three priority lanes. High drains before Normal before Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Lane index in drain order: High first.
    pub fn lane(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Per-submission overrides accepted alongside the payload.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub priority: Priority,
    /// Overrides the global retry cap when set.
    pub max_retries: Option<u32>,
    /// Overrides the default per-request timeout when set.
    pub timeout_ms: Option<u64>,
    /// Coalesce with same-name submissions into a batch.
    pub batchable: bool,
}

/// Deduplication key: logical name plus salient payload fields,
/// order-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One logical request submitted to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub name: String,
    pub priority: Priority,
    pub payload: Payload,
    /// Zero-based attempt counter; persists across retries.
    pub attempt: u32,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(name: impl Into<String>, payload: Payload, options: &SubmitOptions) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            priority: options.priority,
            payload,
            attempt: 0,
            max_retries: options.max_retries,
            timeout_ms: options.timeout_ms,
            created_at: Utc::now(),
        }
    }

    /// Compute the dedup fingerprint. The payload is a sorted map, so the
    /// hash is independent of submission field order; `_`-prefixed keys are
    /// skipped.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = std::hash::DefaultHasher::new();
        self.name.hash(&mut hasher);
        for (key, value) in &self.payload {
            if key.starts_with('_') {
                continue;
            }
            key.hash(&mut hasher);
            value.to_string().hash(&mut hasher);
        }
        Fingerprint(hasher.finish())
    }
}

/// Archived entry for a terminal operation, kept in the bounded history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub op_id: String,
    pub name: String,
    pub priority: Priority,
    pub success: bool,
    /// Terminal error rendering, absent on success.
    pub error: Option<String>,
    /// Attempts actually made (1 = no retries).
    pub attempts: u32,
    pub duration_ms: i64,
    /// Breaker state for this operation name at completion time.
    pub breaker_state: BreakerStateKind,
    pub completed_at: DateTime<Utc>,
}
