//! Bounded completion history and aggregate metrics.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::operation::{OperationRecord, OperationResult};

/// Ring of terminal operation records, newest last. Oldest entries are
/// evicted once the capacity is reached.
pub struct History {
    records: VecDeque<OperationRecord>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn push(&mut self, record: OperationRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records matching the filter, newest first.
    pub fn query(&self, filter: &HistoryFilter) -> Vec<OperationRecord> {
        let matched = self
            .records
            .iter()
            .rev()
            .filter(|r| filter.name.as_deref().is_none_or(|n| r.name == n))
            .filter(|r| !filter.failures_only || !r.success);
        match filter.limit {
            Some(limit) => matched.take(limit).cloned().collect(),
            None => matched.cloned().collect(),
        }
    }
}

/// Query parameters for [`History::query`].
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Restrict to one operation name.
    pub name: Option<String>,
    /// Only failed operations.
    pub failures_only: bool,
    /// At most this many records.
    pub limit: Option<usize>,
}

/// Incrementally-maintained counters, updated at submission and completion.
pub struct MetricsCounters {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub deduplicated: u64,
    pub batched: u64,
    total_duration_ms: u64,
    min_duration_ms: Option<u64>,
    max_duration_ms: u64,
    started_at: DateTime<Utc>,
}

impl MetricsCounters {
    pub fn new() -> Self {
        Self {
            submitted: 0,
            succeeded: 0,
            failed: 0,
            retries: 0,
            deduplicated: 0,
            batched: 0,
            total_duration_ms: 0,
            min_duration_ms: None,
            max_duration_ms: 0,
            started_at: Utc::now(),
        }
    }

    /// Fold in one terminal outcome.
    pub fn record(&mut self, result: &OperationResult, duration_ms: u64) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
        self.total_duration_ms += duration_ms;
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        self.min_duration_ms = Some(match self.min_duration_ms {
            Some(min) => min.min(duration_ms),
            None => duration_ms,
        });
    }

    pub fn snapshot(&self) -> PipelineMetrics {
        let completed = self.succeeded + self.failed;
        let elapsed_min = (Utc::now() - self.started_at)
            .num_milliseconds()
            .max(1) as f64
            / 60_000.0;
        PipelineMetrics {
            submitted: self.submitted,
            succeeded: self.succeeded,
            failed: self.failed,
            retries: self.retries,
            deduplicated: self.deduplicated,
            batched: self.batched,
            success_rate: if completed == 0 {
                1.0
            } else {
                self.succeeded as f64 / completed as f64
            },
            retry_rate: if completed == 0 {
                0.0
            } else {
                self.retries as f64 / completed as f64
            },
            avg_duration_ms: if completed == 0 {
                0
            } else {
                self.total_duration_ms / completed
            },
            min_duration_ms: self.min_duration_ms.unwrap_or(0),
            max_duration_ms: self.max_duration_ms,
            throughput_per_min: completed as f64 / elapsed_min,
        }
    }
}

impl Default for MetricsCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time aggregate view, cheap to compute from the counters.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub deduplicated: u64,
    pub batched: u64,
    /// Fraction of terminal operations that succeeded; 1.0 before any
    /// completion.
    pub success_rate: f64,
    /// Retries per terminal operation.
    pub retry_rate: f64,
    pub avg_duration_ms: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub throughput_per_min: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::operation::Priority;
    use crate::retry::BreakerStateKind;

    fn record(name: &str, success: bool) -> OperationRecord {
        OperationRecord {
            op_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            priority: Priority::Normal,
            success,
            error: (!success).then(|| "failed".to_string()),
            attempts: 1,
            duration_ms: 10,
            breaker_state: BreakerStateKind::Closed,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.push(record(&format!("op_{i}"), true));
        }
        assert_eq!(history.len(), 3);
        let names: Vec<String> = history
            .query(&HistoryFilter::default())
            .into_iter()
            .map(|r| r.name)
            .collect();
        // Newest first, oldest two evicted.
        assert_eq!(names, vec!["op_4", "op_3", "op_2"]);
    }

    #[test]
    fn query_filters_by_name_and_outcome() {
        let mut history = History::new(10);
        history.push(record("save", true));
        history.push(record("save", false));
        history.push(record("load", false));

        let filter = HistoryFilter {
            name: Some("save".into()),
            ..Default::default()
        };
        assert_eq!(history.query(&filter).len(), 2);

        let filter = HistoryFilter {
            failures_only: true,
            ..Default::default()
        };
        let failures = history.query(&filter);
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|r| !r.success));

        let filter = HistoryFilter {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(history.query(&filter)[0].name, "load");
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let mut history = History::new(5);
        for i in 0..5 {
            history.push(record(&format!("op_{i}"), true));
        }
        history.set_capacity(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.query(&HistoryFilter::default())[1].name, "op_3");
    }

    #[test]
    fn counters_track_rates_and_latency_extremes() {
        let mut counters = MetricsCounters::new();
        counters.submitted = 4;
        counters.retries = 1;
        counters.record(&Ok(serde_json::Value::Null), 10);
        counters.record(&Ok(serde_json::Value::Null), 30);
        counters.record(&Err(PipelineError::MissingNonce), 20);

        let metrics = counters.snapshot();
        assert_eq!(metrics.succeeded, 2);
        assert_eq!(metrics.failed, 1);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.retry_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.avg_duration_ms, 20);
        assert_eq!(metrics.min_duration_ms, 10);
        assert_eq!(metrics.max_duration_ms, 30);
    }

    #[test]
    fn empty_counters_report_benign_defaults() {
        let metrics = MetricsCounters::new().snapshot();
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.retry_rate, 0.0);
        assert_eq!(metrics.avg_duration_ms, 0);
        assert_eq!(metrics.min_duration_ms, 0);
    }
}
