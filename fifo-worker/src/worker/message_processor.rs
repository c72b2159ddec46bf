use std::collections::HashSet;
use std::sync::Arc;

use queue::{Message, QueueClient, QueueError};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::handler::MessageHandler;
use crate::types::{WorkerError, WorkerResult};
use crate::worker::{
    config::WorkerConfig,
    group_gate::GroupGate,
    observer::WorkerObserver,
    types::{ProcessResult, WorkerId, WorkerState, WorkerStats},
};

/// `MessageProcessor` runs the receive, handle, acknowledge loop of one worker
pub struct MessageProcessor {
    worker_id: WorkerId,
    queue: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    observer: Arc<dyn WorkerObserver>,
    group_gate: Option<Arc<GroupGate>>,
    config: Arc<WorkerConfig>,
    stats: watch::Sender<WorkerStats>,
}

impl MessageProcessor {
    /// Creates a new `MessageProcessor`
    #[must_use]
    pub fn new(
        worker_id: WorkerId,
        queue: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
        observer: Arc<dyn WorkerObserver>,
        group_gate: Option<Arc<GroupGate>>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        let (stats, _) = watch::channel(WorkerStats::new(worker_id));
        Self {
            worker_id,
            queue,
            handler,
            observer,
            group_gate,
            config,
            stats,
        }
    }

    #[must_use]
    pub const fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Snapshot of this worker's counters
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        self.stats.borrow().clone()
    }

    /// Read-only view of this worker's counters
    #[must_use]
    pub fn subscribe_stats(&self) -> watch::Receiver<WorkerStats> {
        self.stats.subscribe()
    }

    /// Counts a restart of this worker slot and returns the new total
    pub(crate) fn record_restart(&self) -> u32 {
        self.stats.send_modify(|stats| stats.restarts += 1);
        self.stats.borrow().restarts
    }

    pub(crate) fn mark_stopped(&self) {
        self.set_state(WorkerState::Stopped);
    }

    fn set_state(&self, state: WorkerState) {
        self.stats.send_if_modified(|stats| {
            let changed = stats.state != state;
            stats.state = state;
            changed
        });
    }

    /// Runs the message processor loop until `shutdown` is cancelled
    ///
    /// Cancellation is checked before every receive and interrupts the
    /// backoff sleep. A handle or delete in progress always completes first.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker_id = self.worker_id, "Message processor started");

        loop {
            self.set_state(WorkerState::Polling);
            if shutdown.is_cancelled() {
                info!(worker_id = self.worker_id, "Message processor received shutdown signal");
                break;
            }

            if let Err(e) = self.poll_once().await {
                self.observer.on_receive_error(self.worker_id, &e);
                self.set_state(WorkerState::BackingOff);

                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!(worker_id = self.worker_id, "Message processor shutting down during backoff");
                        break;
                    }
                    () = sleep(self.config.receive_backoff) => {}
                }
            }
        }

        self.set_state(WorkerState::Stopped);
        info!(worker_id = self.worker_id, "Message processor stopped");
    }

    /// Receives one batch and handles its messages in receive order
    ///
    /// Once a grouped message is left on the queue (handler failure under
    /// `DeleteOnSuccess`, or a failed delete), the remaining messages of that
    /// group in the batch are skipped. They stay leased and are redelivered
    /// after the one left behind.
    ///
    /// Returns the number of messages received.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Receive` if the receive call failed or timed out.
    /// Handler and delete failures are reported to the observer and never
    /// returned.
    pub async fn poll_once(&self) -> WorkerResult<usize> {
        let messages = self.receive().await?;

        if messages.is_empty() {
            debug!(worker_id = self.worker_id, "Received no messages");
            return Ok(0);
        }

        let count = messages.len();
        debug!(worker_id = self.worker_id, count, "Received messages");

        let mut held_back: HashSet<String> = HashSet::new();
        for message in messages {
            if let Some(group_id) = message.group_id.as_deref() {
                if held_back.contains(group_id) {
                    debug!(
                        worker_id = self.worker_id,
                        message_id = %message.message_id,
                        group_id,
                        "Skipping message queued behind an unacknowledged one"
                    );
                    continue;
                }
            }

            let group_id = message.group_id.clone();
            let acknowledged = self.process_and_ack(message).await;
            if let (false, Some(group_id)) = (acknowledged, group_id) {
                held_back.insert(group_id);
            }
        }

        Ok(count)
    }

    async fn receive(&self) -> WorkerResult<Vec<Message>> {
        let limit = self.config.receive_timeout();
        let receiving = self
            .queue
            .receive(self.config.max_messages, self.config.wait_time);

        match timeout(limit, receiving).await {
            Ok(result) => result.map_err(WorkerError::Receive),
            Err(_) => Err(WorkerError::Receive(QueueError::Timeout {
                operation: "receive",
                after: limit,
            })),
        }
    }

    #[instrument(skip(self, message), fields(worker_id = self.worker_id, message_id = %message.message_id))]
    async fn process_and_ack(&self, message: Message) -> bool {
        // Held until the message is acknowledged
        let _permit = match (&self.group_gate, message.group_id.as_deref()) {
            (Some(gate), Some(group_id)) => Some(gate.acquire(group_id).await),
            _ => None,
        };

        self.set_state(WorkerState::Processing);
        let started = Instant::now();
        let outcome = self.handle(&message).await;
        let duration = started.elapsed();
        let success = outcome.is_ok();

        let acknowledged = if self.config.ack_policy.should_delete(success) {
            self.acknowledge(&message).await
        } else {
            debug!("Leaving failed message for redelivery");
            false
        };

        let result = ProcessResult {
            success,
            error: outcome.err(),
            duration,
            message_id: message.message_id,
            group_id: message.group_id,
            worker_id: self.worker_id,
            acknowledged,
        };

        self.stats.send_modify(|stats| stats.record(&result));
        let stats = self.stats();
        self.observer.on_process_result(&result, &stats);
        acknowledged
    }

    async fn handle(&self, message: &Message) -> WorkerResult<()> {
        let handling = self.handler.handle(message);

        match self.config.handler_timeout {
            Some(limit) => timeout(limit, handling)
                .await
                .map_err(|_| WorkerError::HandlerTimeout(limit))?
                .map_err(WorkerError::Handle),
            None => handling.await.map_err(WorkerError::Handle),
        }
    }

    /// Deletes the message once; returns whether the delete succeeded
    async fn acknowledge(&self, message: &Message) -> bool {
        self.set_state(WorkerState::Acknowledging);

        let limit = self.config.delete_timeout;
        let error = match timeout(limit, self.queue.delete(&message.receipt_handle)).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => WorkerError::Delete(e),
            Err(_) => WorkerError::Delete(QueueError::Timeout {
                operation: "delete",
                after: limit,
            }),
        };

        self.observer
            .on_delete_error(self.worker_id, &message.message_id, &error);
        false
    }
}
