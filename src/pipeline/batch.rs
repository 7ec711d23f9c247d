//! Batch accumulation.
//!
//! Batchable submissions with the same operation name coalesce into a
//! [`PendingBatch`]. A batch flushes when it reaches the size threshold or
//! when its window elapses, whichever comes first. Each member keeps its own
//! outcome channel, so dissolving a batch yields one result per submission
//! in the original order.

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::operation::{Operation, OperationResult};

/// One batched submission and the channel its submitter awaits.
pub struct BatchMember {
    pub op: Operation,
    pub waiter: oneshot::Sender<OperationResult>,
}

/// Accumulating batch for one operation name.
pub struct PendingBatch {
    pub name: String,
    pub members: Vec<BatchMember>,
    /// When the first member arrived; starts the flush window.
    pub opened_at: Instant,
}

impl PendingBatch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
            opened_at: Instant::now(),
        }
    }

    pub fn push(&mut self, op: Operation, waiter: oneshot::Sender<OperationResult>) {
        self.members.push(BatchMember { op, waiter });
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Window expiry check, measured from the first member.
    pub fn is_due(&self, window: std::time::Duration) -> bool {
        self.opened_at.elapsed() >= window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Payload, SubmitOptions};
    use std::time::Duration;

    fn member() -> (Operation, oneshot::Sender<OperationResult>) {
        let (tx, _rx) = oneshot::channel();
        let op = Operation::new("bulk_update", Payload::new(), &SubmitOptions::default());
        (op, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_measured_from_first_member() {
        let mut batch = PendingBatch::new("bulk_update");
        let (op, tx) = member();
        batch.push(op, tx);
        assert!(!batch.is_due(Duration::from_millis(1000)));

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(batch.is_due(Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn members_keep_submission_order() {
        let mut batch = PendingBatch::new("bulk_update");
        for _ in 0..3 {
            let (op, tx) = member();
            batch.push(op, tx);
        }
        assert_eq!(batch.len(), 3);
        let ids: std::collections::HashSet<&str> =
            batch.members.iter().map(|m| m.op.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
    }
}
