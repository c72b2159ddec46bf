use std::sync::Arc;
use std::time::Duration;

use aws_sdk_sqs::Client as SqsClient;
use queue::{QueueClient, SqsQueueClient};
use tracing::info;

use crate::handler::{LoggingHandler, MessageHandler};
use crate::types::{Environment, WorkerResult};
use crate::worker::{TracingObserver, WorkerConfig, WorkerObserver, WorkerPool};

/// Wires the queue client, handler, observer and pool configuration together
///
/// Every collaborator can be replaced before the pool is built:
///
/// ```ignore
/// let pool = Consumer::from_environment(&env)
///     .await?
///     .with_handler(Arc::new(MyHandler::default()))
///     .into_pool();
/// ```
pub struct Consumer {
    queue: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    observer: Arc<dyn WorkerObserver>,
    config: WorkerConfig,
}

impl Consumer {
    /// Creates a consumer with the logging handler and tracing observer
    #[must_use]
    pub fn new(queue: Arc<dyn QueueClient>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler: Arc::new(LoggingHandler::new(Duration::ZERO)),
            observer: Arc::new(TracingObserver),
            config,
        }
    }

    /// Builds an SQS-backed consumer from the process environment
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::MissingConfig` if the queue URL is not set
    /// outside development.
    pub async fn from_environment(env: &Environment) -> WorkerResult<Self> {
        let queue_config = env.queue_config()?;
        info!(
            queue_url = %queue_config.queue_url,
            visibility_timeout_secs = queue_config.visibility_timeout.as_secs(),
            "Initializing SQS queue client"
        );

        let sqs_client = Arc::new(SqsClient::new(&env.aws_config().await));
        let queue = Arc::new(SqsQueueClient::new(sqs_client, queue_config));

        Ok(Self::new(queue, WorkerConfig::from_environment(env)?)
            .with_handler(Arc::new(LoggingHandler::new(env.handler_delay()))))
    }

    /// Replaces the message handler
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Replaces the observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn WorkerObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Builds the worker pool
    #[must_use]
    pub fn into_pool(self) -> WorkerPool {
        info!(
            max_workers = self.config.max_workers,
            max_messages = self.config.max_messages,
            ack_policy = %self.config.ack_policy,
            group_exclusive = self.config.group_exclusive,
            "Creating worker pool"
        );
        WorkerPool::new(self.queue, self.handler, self.observer, self.config)
    }
}
