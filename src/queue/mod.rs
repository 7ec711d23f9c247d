//! Three-lane priority queue with admission control.
//!
//! Pending operations live in one of three FIFO lanes drained
//! High→Normal→Low. The queue itself is not thread-safe; the pipeline owns
//! it behind its state lock. Deduplication bookkeeping (active set, recent
//! completions) also lives with the pipeline — this module only answers
//! "is an equivalent operation already pending?".

pub mod persist;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::error::PipelineError;
use crate::operation::{Fingerprint, Operation, OperationResult};

/// A pending operation plus its outcome waiters. Duplicate submissions
/// attach additional senders; every waiter observes the same result.
pub struct QueueEntry {
    pub op: Operation,
    pub fingerprint: Fingerprint,
    pub enqueued_at: DateTime<Utc>,
    pub waiters: Vec<oneshot::Sender<OperationResult>>,
}

impl QueueEntry {
    pub fn new(op: Operation) -> Self {
        let fingerprint = op.fingerprint();
        Self {
            op,
            fingerprint,
            enqueued_at: Utc::now(),
            waiters: Vec::new(),
        }
    }

    pub fn with_waiter(op: Operation, waiter: oneshot::Sender<OperationResult>) -> Self {
        let mut entry = Self::new(op);
        entry.waiters.push(waiter);
        entry
    }
}

/// The three priority lanes.
pub struct PriorityQueue {
    lanes: [VecDeque<QueueEntry>; 3],
    max_pending: usize,
}

impl PriorityQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            lanes: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            max_pending,
        }
    }

    /// Runtime capacity adjustment. Already-queued operations above a
    /// lowered limit are kept; only new admissions are rejected.
    pub fn set_capacity(&mut self, max_pending: usize) {
        self.max_pending = max_pending;
    }

    pub fn pending(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    pub fn lane_depths(&self) -> [usize; 3] {
        [self.lanes[0].len(), self.lanes[1].len(), self.lanes[2].len()]
    }

    /// Admit an entry, or reject with a capacity error leaving the queue
    /// untouched.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Result<(), PipelineError> {
        let pending = self.pending();
        if pending >= self.max_pending {
            return Err(PipelineError::QueueFull {
                pending,
                limit: self.max_pending,
            });
        }
        self.lanes[entry.op.priority.lane()].push_back(entry);
        Ok(())
    }

    /// Next entry to dispatch: FIFO within lane, High before Normal before
    /// Low.
    pub fn dequeue(&mut self) -> Option<QueueEntry> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Find a pending entry with the given fingerprint, searching lanes in
    /// drain order.
    pub fn find_mut(&mut self, fingerprint: Fingerprint) -> Option<&mut QueueEntry> {
        self.lanes
            .iter_mut()
            .flat_map(|lane| lane.iter_mut())
            .find(|entry| entry.fingerprint == fingerprint)
    }

    /// Remove and return every pending entry, High lane first. Used by
    /// teardown to force-fail outstanding outcomes.
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        let mut drained = Vec::with_capacity(self.pending());
        for lane in &mut self.lanes {
            drained.extend(lane.drain(..));
        }
        drained
    }

    /// Pending operations per lane, for snapshots.
    pub fn lane_operations(&self, lane: usize) -> Vec<Operation> {
        self.lanes[lane].iter().map(|e| e.op.clone()).collect()
    }
}
