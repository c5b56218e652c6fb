//! Corrective actions and the bounded history buffer that records them (spec.md §4.8 "All
//! corrections are recorded; the history buffer is bounded").
use std::collections::VecDeque;

use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

/// One auto-correction applied by the Health Monitor (spec.md §4.8 corrective action table).
#[derive(Clone, Debug)]
pub enum CorrectionAction {
    /// A stuck task was requeued to the head of its queue with `previouslyStuck=true`.
    RequeueStuck { task_id: Uuid },
    /// A `scale_up(queue)` command was published because of sustained high depth.
    ScaleUp { depth: usize },
    /// Pending tasks were migrated away from an overloaded queue during a redistribution pass.
    Redistribute { migrated: usize },
    /// A worker was flagged for an elevated recent failure count.
    FlagWorker { worker_id: String, recent_failures: usize },
    /// A dead-lettered task was moved back onto the main queue.
    DlqRetry { task_id: Uuid },
    /// A DLQ retry was attempted but rejected by the dampener or the hard cap.
    DlqRetryRejected { task_id: Uuid, reason: String },
}

impl CorrectionAction {
    pub fn kind(&self) -> &'static str {
        match self {
            CorrectionAction::RequeueStuck { .. } => "requeue_stuck",
            CorrectionAction::ScaleUp { .. } => "scale_up",
            CorrectionAction::Redistribute { .. } => "redistribute",
            CorrectionAction::FlagWorker { .. } => "flag_worker",
            CorrectionAction::DlqRetry { .. } => "dlq_retry",
            CorrectionAction::DlqRetryRejected { .. } => "dlq_retry_rejected",
        }
    }
}

/// A recorded correction, timestamped and scoped to the queue it was applied to.
#[derive(Clone, Debug)]
pub struct CorrectionRecord {
    pub queue: String,
    pub action: CorrectionAction,
    pub ts: DateTime<Utc>,
}

/// Fixed-capacity ring of recent corrections (spec.md "bounded (default 1000)"), following the
/// spec's redesign guidance ("in-process unbounded maps ... bounded ring ... with explicit
/// capacity; eviction on size or age") rather than an unbounded `Vec`.
pub struct History {
    entries: VecDeque<CorrectionRecord>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> History {
        History {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, queue: impl Into<String>, action: CorrectionAction) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CorrectionRecord {
            queue: queue.into(),
            action,
            ts: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorrectionRecord> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut history = History::new(2);
        history.push("q1", CorrectionAction::ScaleUp { depth: 101 });
        history.push("q1", CorrectionAction::ScaleUp { depth: 102 });
        history.push("q1", CorrectionAction::ScaleUp { depth: 103 });
        assert_eq!(history.len(), 2);
        let kinds: Vec<&str> = history.iter().map(|record| record.action.kind()).collect();
        assert_eq!(kinds, vec!["scale_up", "scale_up"]);
    }
}
