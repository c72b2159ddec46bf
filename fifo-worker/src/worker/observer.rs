//! Observability hooks for the worker loop
//!
//! The processor and pool report what happened through [`WorkerObserver`].

use metrics::{counter, histogram};
use tracing::{debug, error, warn};

use crate::types::WorkerError;
use crate::worker::types::{ProcessResult, WorkerId, WorkerStats};

/// Receives events from the worker pool
///
/// Called inline from the worker loop; implementations must not block.
pub trait WorkerObserver: Send + Sync {
    /// A handling attempt finished
    fn on_process_result(&self, result: &ProcessResult, stats: &WorkerStats);

    /// A receive call failed and the worker is about to back off
    fn on_receive_error(&self, worker_id: WorkerId, error: &WorkerError);

    /// Deleting a handled message failed
    fn on_delete_error(&self, worker_id: WorkerId, message_id: &str, error: &WorkerError);

    /// A worker loop panicked and was restarted in the same slot
    fn on_worker_restarted(&self, worker_id: WorkerId, restarts: u32);
}

/// Default observer: structured `tracing` events plus `metrics` counters
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WorkerObserver for TracingObserver {
    fn on_process_result(&self, result: &ProcessResult, stats: &WorkerStats) {
        histogram!("handle_duration_seconds").record(result.duration.as_secs_f64());

        if result.success {
            counter!("messages_processed").increment(1);
            debug!(
                worker_id = result.worker_id,
                message_id = %result.message_id,
                group_id = ?result.group_id,
                duration_ms = result.duration.as_millis(),
                acknowledged = result.acknowledged,
                processed = stats.processed_count,
                "Processed message"
            );
        } else {
            counter!("messages_failed").increment(1);
            error!(
                worker_id = result.worker_id,
                message_id = %result.message_id,
                group_id = ?result.group_id,
                duration_ms = result.duration.as_millis(),
                acknowledged = result.acknowledged,
                errors = stats.error_count,
                error = ?result.error,
                "Failed to process message"
            );
        }
    }

    fn on_receive_error(&self, worker_id: WorkerId, error: &WorkerError) {
        counter!("receive_errors").increment(1);
        if matches!(error, WorkerError::Receive(e) if e.is_upstream_error()) {
            counter!("receive_upstream_errors").increment(1);
        }
        warn!(worker_id, error = %error, "Failed to receive messages, backing off");
    }

    fn on_delete_error(&self, worker_id: WorkerId, message_id: &str, error: &WorkerError) {
        counter!("delete_errors").increment(1);
        error!(
            worker_id,
            message_id,
            error = %error,
            "Failed to delete message, it will be redelivered after the visibility timeout"
        );
    }

    fn on_worker_restarted(&self, worker_id: WorkerId, restarts: u32) {
        counter!("worker_restarts").increment(1);
        error!(worker_id, restarts, "Worker panicked, restarting");
    }
}
