#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fifo_worker::handler::MessageHandler;
use fifo_worker::types::WorkerError;
use fifo_worker::worker::{
    ProcessResult, WorkerConfig, WorkerId, WorkerObserver, WorkerPool, WorkerStats,
};
use queue::{Message, QueueClient, QueueError, QueueResult};
use tokio::time::{sleep, Instant};

/// Setup tracing for tests
pub fn setup_test_env() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Builds a message whose receipt handle is derived from its id
pub fn message(id: &str, group_id: Option<&str>) -> Message {
    Message {
        message_id: id.to_string(),
        group_id: group_id.map(ToString::to_string),
        receipt_handle: format!("rh-{id}"),
        body: format!("body of {id}"),
        ..Default::default()
    }
}

/// Fast timings so paused-clock tests stay short
pub fn test_config(max_workers: usize) -> WorkerConfig {
    WorkerConfig {
        max_workers,
        wait_time: Duration::from_millis(200),
        receive_timeout_margin: Duration::from_millis(100),
        ..Default::default()
    }
}

// ============================================================================
// ScriptedQueue
// ============================================================================

/// One scripted answer to a receive call
pub enum Scripted {
    Batch(Vec<Message>),
    Fail,
    Hang,
}

/// Queue fake that answers receives from a script
///
/// Once the script is exhausted every receive long-polls for `wait_time` and
/// returns nothing.
#[derive(Default)]
pub struct ScriptedQueue {
    script: Mutex<VecDeque<Scripted>>,
    receive_times: Mutex<Vec<Instant>>,
    received: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_deletes: AtomicBool,
}

impl ScriptedQueue {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new([])
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn receive_times(&self) -> Vec<Instant> {
        self.receive_times.lock().unwrap().clone()
    }

    pub fn receive_count(&self) -> usize {
        self.receive_times.lock().unwrap().len()
    }

    /// Ids of deleted messages, in deletion order
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Received messages that were never deleted
    pub fn in_flight_ids(&self) -> Vec<String> {
        let deleted: HashSet<String> = self.deleted_ids().into_iter().collect();
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|id| !deleted.contains(*id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QueueClient for ScriptedQueue {
    async fn receive(&self, _max_messages: i32, wait_time: Duration) -> QueueResult<Vec<Message>> {
        self.receive_times.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();

        match next {
            Some(Scripted::Batch(messages)) => {
                self.received
                    .lock()
                    .unwrap()
                    .extend(messages.iter().map(|m| m.message_id.clone()));
                Ok(messages)
            }
            Some(Scripted::Fail) => Err(QueueError::Unavailable("scripted failure".to_string())),
            Some(Scripted::Hang) => std::future::pending().await,
            None => {
                sleep(wait_time).await;
                Ok(vec![])
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(QueueError::StaleReceiptHandle);
        }
        let id = receipt_handle.trim_start_matches("rh-").to_string();
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }
}

// ============================================================================
// RecordingHandler
// ============================================================================

/// Handler that records every call and fails or panics on chosen messages
#[derive(Default)]
pub struct RecordingHandler {
    delay: Duration,
    failing: HashSet<String>,
    panic_once: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    active_by_group: Mutex<HashMap<String, usize>>,
    max_active_per_group: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, message_id: &str) -> Self {
        self.failing.insert(message_id.to_string());
        self
    }

    pub fn panicking_once_on(self, message_id: &str) -> Self {
        self.panic_once
            .lock()
            .unwrap()
            .insert(message_id.to_string());
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// Highest number of concurrent calls seen for any single group
    pub fn max_active_per_group(&self) -> usize {
        self.max_active_per_group.load(Ordering::SeqCst)
    }

    fn enter_group(&self, group_id: &str) {
        let mut active = self.active_by_group.lock().unwrap();
        let count = active.entry(group_id.to_string()).or_default();
        *count += 1;
        self.max_active_per_group
            .fetch_max(*count, Ordering::SeqCst);
    }

    fn leave_group(&self, group_id: &str) {
        let mut active = self.active_by_group.lock().unwrap();
        if let Some(count) = active.get_mut(group_id) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        let id = message.message_id.clone();
        self.started.lock().unwrap().push(id.clone());

        let should_panic = self.panic_once.lock().unwrap().remove(&id);
        if should_panic {
            panic!("handler panicked on {id}");
        }

        if let Some(group_id) = &message.group_id {
            self.enter_group(group_id);
        }
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if let Some(group_id) = &message.group_id {
            self.leave_group(group_id);
        }

        self.completed.lock().unwrap().push(id.clone());

        if self.failing.contains(&id) {
            anyhow::bail!("handler rejected {id}");
        }
        Ok(())
    }
}

// ============================================================================
// RecordingObserver
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedResult {
    pub message_id: String,
    pub worker_id: WorkerId,
    pub success: bool,
    pub acknowledged: bool,
    pub duration: Duration,
    pub error: Option<String>,
    pub handler_timed_out: bool,
}

/// Observer that keeps every event for later assertions
#[derive(Default)]
pub struct RecordingObserver {
    results: Mutex<Vec<RecordedResult>>,
    receive_errors: AtomicUsize,
    delete_errors: Mutex<Vec<String>>,
    restarts: Mutex<Vec<(WorkerId, u32)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn results(&self) -> Vec<RecordedResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn receive_errors(&self) -> usize {
        self.receive_errors.load(Ordering::SeqCst)
    }

    pub fn delete_errors(&self) -> Vec<String> {
        self.delete_errors.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> Vec<(WorkerId, u32)> {
        self.restarts.lock().unwrap().clone()
    }

    /// Waits (on the test clock) until `count` results were recorded
    pub async fn wait_for_results(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while self.results.lock().unwrap().len() < count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for process results");
    }
}

impl WorkerObserver for RecordingObserver {
    fn on_process_result(&self, result: &ProcessResult, _stats: &WorkerStats) {
        self.results.lock().unwrap().push(RecordedResult {
            message_id: result.message_id.clone(),
            worker_id: result.worker_id,
            success: result.success,
            acknowledged: result.acknowledged,
            duration: result.duration,
            error: result.error.as_ref().map(ToString::to_string),
            handler_timed_out: matches!(result.error, Some(WorkerError::HandlerTimeout(_))),
        });
    }

    fn on_receive_error(&self, _worker_id: WorkerId, _error: &WorkerError) {
        self.receive_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_delete_error(&self, _worker_id: WorkerId, message_id: &str, _error: &WorkerError) {
        self.delete_errors
            .lock()
            .unwrap()
            .push(message_id.to_string());
    }

    fn on_worker_restarted(&self, worker_id: WorkerId, restarts: u32) {
        self.restarts.lock().unwrap().push((worker_id, restarts));
    }
}

/// Pool wired to the test doubles
pub fn test_pool(
    queue: Arc<dyn QueueClient>,
    handler: Arc<RecordingHandler>,
    observer: Arc<RecordingObserver>,
    config: WorkerConfig,
) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(queue, handler, observer, config))
}
