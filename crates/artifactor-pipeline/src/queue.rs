use std::sync::atomic::{AtomicI64, Ordering};

use artifactor_core::types::{InferencePriority, InferenceRequest};
use artifactor_metrics::MetricsCollector;
use tokio::sync::mpsc;

/// Three FIFO priority lanes feeding the worker pool. `high` is always
/// drained ahead of `medium`, which is always drained ahead of `low`
/// (SPEC_FULL.md §4.2 scheduling model).
pub struct PriorityQueues {
    high_tx: mpsc::UnboundedSender<InferenceRequest>,
    medium_tx: mpsc::UnboundedSender<InferenceRequest>,
    low_tx: mpsc::UnboundedSender<InferenceRequest>,
    high_depth: AtomicI64,
    medium_depth: AtomicI64,
    low_depth: AtomicI64,
}

pub struct QueueReceivers {
    pub high: mpsc::UnboundedReceiver<InferenceRequest>,
    pub medium: mpsc::UnboundedReceiver<InferenceRequest>,
    pub low: mpsc::UnboundedReceiver<InferenceRequest>,
}

impl PriorityQueues {
    pub fn new() -> (Self, QueueReceivers) {
        let (high_tx, high) = mpsc::unbounded_channel();
        let (medium_tx, medium) = mpsc::unbounded_channel();
        let (low_tx, low) = mpsc::unbounded_channel();
        (
            Self {
                high_tx,
                medium_tx,
                low_tx,
                high_depth: AtomicI64::new(0),
                medium_depth: AtomicI64::new(0),
                low_depth: AtomicI64::new(0),
            },
            QueueReceivers { high, medium, low },
        )
    }

    /// Enqueue `req` onto the lane matching its priority. Priority `High`
    /// requests are never queued by callers (they're processed inline) but
    /// routing them here too keeps the type total.
    pub fn push(&self, req: InferenceRequest, metrics: &MetricsCollector) {
        let (tx, depth) = match req.priority {
            InferencePriority::High => (&self.high_tx, &self.high_depth),
            InferencePriority::Medium => (&self.medium_tx, &self.medium_depth),
            InferencePriority::Low => (&self.low_tx, &self.low_depth),
        };
        let _ = tx.send(req);
        let new_depth = depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.report(metrics);
        let _ = new_depth;
    }

    pub fn mark_dequeued(&self, priority: InferencePriority, metrics: &MetricsCollector) {
        let depth = match priority {
            InferencePriority::High => &self.high_depth,
            InferencePriority::Medium => &self.medium_depth,
            InferencePriority::Low => &self.low_depth,
        };
        depth.fetch_sub(1, Ordering::SeqCst);
        self.report(metrics);
    }

    fn report(&self, metrics: &MetricsCollector) {
        metrics.set_gauge("pipeline_queue_depth:high", self.high_depth.load(Ordering::SeqCst));
        metrics.set_gauge("pipeline_queue_depth:medium", self.medium_depth.load(Ordering::SeqCst));
        metrics.set_gauge("pipeline_queue_depth:low", self.low_depth.load(Ordering::SeqCst));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifactor_core::types::UserId;
    use chrono::Utc;

    fn req(priority: InferencePriority) -> InferenceRequest {
        InferenceRequest {
            request_id: "r1".into(),
            content: "x".into(),
            title: String::new(),
            description: String::new(),
            file_type: String::new(),
            language: String::new(),
            user_id: UserId::from("u1".to_string()),
            priority,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn push_updates_gauge() {
        let metrics = MetricsCollector::new();
        let (queues, _recv) = PriorityQueues::new();
        queues.push(req(InferencePriority::Medium), &metrics);
        assert_eq!(metrics.get_gauge("pipeline_queue_depth:medium"), 1);
        queues.mark_dequeued(InferencePriority::Medium, &metrics);
        assert_eq!(metrics.get_gauge("pipeline_queue_depth:medium"), 0);
    }
}
