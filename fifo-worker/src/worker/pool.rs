use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use queue::QueueClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::handler::MessageHandler;
use crate::types::{WorkerError, WorkerResult};
use crate::worker::{
    config::WorkerConfig,
    group_gate::GroupGate,
    message_processor::MessageProcessor,
    observer::WorkerObserver,
    types::{PoolState, WorkerStats},
};

/// `WorkerPool` runs a fixed number of message processors until cancelled
pub struct WorkerPool {
    processors: Vec<Arc<MessageProcessor>>,
    observer: Arc<dyn WorkerObserver>,
    shutdown_token: CancellationToken,
    state: Arc<watch::Sender<PoolState>>,
    active: Arc<AtomicUsize>,
    started: AtomicBool,
}

impl WorkerPool {
    /// Creates a new `WorkerPool` with `config.max_workers` processors
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
        observer: Arc<dyn WorkerObserver>,
        config: WorkerConfig,
    ) -> Self {
        let config = Arc::new(config);
        let group_gate = config
            .group_exclusive
            .then(|| Arc::new(GroupGate::new()));

        let processors = (0..config.max_workers)
            .map(|worker_id| {
                Arc::new(MessageProcessor::new(
                    worker_id,
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    Arc::clone(&observer),
                    group_gate.clone(),
                    Arc::clone(&config),
                ))
            })
            .collect();

        let (state, _) = watch::channel(PoolState::Idle);

        Self {
            processors,
            observer,
            shutdown_token: CancellationToken::new(),
            state: Arc::new(state),
            active: Arc::new(AtomicUsize::new(0)),
            started: AtomicBool::new(false),
        }
    }

    /// Returns a clone of the shutdown token for external control
    ///
    /// Cancelling it has the same effect as [`WorkerPool::stop`].
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Notifies on every lifecycle change
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<PoolState> {
        self.state.subscribe()
    }

    /// Worker loops currently alive
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshot of every worker's counters, ordered by worker id
    #[must_use]
    pub fn worker_stats(&self) -> Vec<WorkerStats> {
        self.processors.iter().map(|p| p.stats()).collect()
    }

    /// Spawns every worker and waits until all of them have exited
    ///
    /// Workers stop when `cancel` is cancelled or [`WorkerPool::stop`] is
    /// called. A worker that panics is restarted in the same slot unless the
    /// pool is shutting down.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::AlreadyStarted` if the pool was started before.
    pub async fn start(&self, cancel: &CancellationToken) -> WorkerResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyStarted);
        }

        // One token shared by every worker, cancelled by the caller or by `stop`
        let worker_token = cancel.child_token();
        if self.shutdown_token.is_cancelled() {
            worker_token.cancel();
        }

        let handles = self
            .processors
            .iter()
            .map(|processor| self.spawn_supervised(Arc::clone(processor), worker_token.clone()))
            .collect::<Vec<_>>();

        self.state.send_replace(PoolState::Running);
        info!("Started {} workers", handles.len());

        let link = self.link_shutdown(worker_token);

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Worker supervisor task error: {}", e);
            }
        }

        link.abort();
        self.state.send_replace(PoolState::Stopped);
        info!("All workers finished");

        Ok(())
    }

    /// Requests every worker to stop at its next check point
    ///
    /// Idempotent; may be called before, during or after `start`.
    pub fn stop(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!("Worker pool shutdown initiated");
        }
        self.shutdown_token.cancel();
        mark_stopping(&self.state);
    }

    /// Cancels the worker token on `stop` and tracks the `Stopping` state
    fn link_shutdown(&self, worker_token: CancellationToken) -> JoinHandle<()> {
        let shutdown_token = self.shutdown_token.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            tokio::select! {
                () = shutdown_token.cancelled() => worker_token.cancel(),
                () = worker_token.cancelled() => {}
            }
            mark_stopping(&state);
        })
    }

    fn spawn_supervised(
        &self,
        processor: Arc<MessageProcessor>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let observer = Arc::clone(&self.observer);
        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            loop {
                let run = {
                    let processor = Arc::clone(&processor);
                    let token = token.clone();
                    tokio::spawn(async move { processor.run(token).await })
                };

                match run.await {
                    Ok(()) => break,
                    Err(e) if e.is_panic() && !token.is_cancelled() => {
                        let restarts = processor.record_restart();
                        observer.on_worker_restarted(processor.worker_id(), restarts);
                    }
                    Err(e) => {
                        error!(
                            worker_id = processor.worker_id(),
                            "Worker task ended abnormally: {}", e
                        );
                        processor.mark_stopped();
                        break;
                    }
                }
            }

            active.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

fn mark_stopping(state: &watch::Sender<PoolState>) {
    state.send_if_modified(|current| {
        if *current == PoolState::Running {
            *current = PoolState::Stopping;
            true
        } else {
            false
        }
    });
}
