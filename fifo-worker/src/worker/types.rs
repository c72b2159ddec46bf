use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::types::WorkerError;

/// Identifier of a worker slot in the pool
pub type WorkerId = usize;

/// When a handled message is deleted from the queue
///
/// - `DeleteAlways`: delete after every handling attempt. A handler failure
///   is logged and the message is gone; there is no second attempt.
/// - `DeleteOnSuccess`: delete only after a successful attempt. A failed
///   message stays leased and is redelivered once its visibility window
///   expires, so handlers get retried until the queue's redrive policy
///   (if any) moves the message aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Delete regardless of the handler outcome
    #[default]
    DeleteAlways,
    /// Delete only when the handler succeeded
    DeleteOnSuccess,
}

impl AckPolicy {
    /// Whether a message should be deleted given the handler outcome
    #[must_use]
    pub const fn should_delete(self, handled_ok: bool) -> bool {
        match self {
            Self::DeleteAlways => true,
            Self::DeleteOnSuccess => handled_ok,
        }
    }
}

/// Where a worker is in its receive, handle, acknowledge cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting on a long-poll receive
    Polling,
    /// Running the message handler
    Processing,
    /// Deleting a handled message
    Acknowledging,
    /// Sleeping after a failed receive
    BackingOff,
    /// Loop has exited
    Stopped,
}

/// Lifecycle of the whole pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Created, not started
    Idle,
    /// Every worker has been spawned
    Running,
    /// Cancellation requested, workers draining
    Stopping,
    /// Every worker has exited
    Stopped,
}

/// Outcome of one handling attempt
#[derive(Debug)]
pub struct ProcessResult {
    /// Whether the handler succeeded
    pub success: bool,
    /// Handler error, if any
    pub error: Option<WorkerError>,
    /// Time spent in the handler
    pub duration: Duration,
    /// Message ID
    pub message_id: String,
    /// Group of the message, if any
    pub group_id: Option<String>,
    /// Worker that handled the message
    pub worker_id: WorkerId,
    /// Whether the message was deleted from the queue
    pub acknowledged: bool,
}

/// Per-worker counters, written only by the owning worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Worker slot
    pub worker_id: WorkerId,
    /// Messages handled, successful or not
    pub processed_count: u64,
    /// Handler failures
    pub error_count: u64,
    /// When the last message finished handling
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Current position in the loop
    pub state: WorkerState,
    /// Times this slot was restarted after a panic
    pub restarts: u32,
}

impl WorkerStats {
    /// Fresh stats for a worker that has not polled yet
    #[must_use]
    pub const fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            processed_count: 0,
            error_count: 0,
            last_processed_at: None,
            state: WorkerState::Polling,
            restarts: 0,
        }
    }

    /// Counts a finished handling attempt
    pub fn record(&mut self, result: &ProcessResult) {
        self.processed_count += 1;
        if !result.success {
            self.error_count += 1;
        }
        self.last_processed_at = Some(Utc::now());
    }
}
