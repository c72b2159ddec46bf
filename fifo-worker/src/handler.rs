use std::time::Duration;

use async_trait::async_trait;
use queue::Message;
use tracing::info;

/// Business logic invoked once per received message
///
/// Delivery is at-least-once, so the same message can reach `handle` more
/// than once over the life of the system. Handlers must be idempotent and
/// must not touch the queue themselves.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles a single message
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handled. What happens to
    /// the message afterwards depends on the pool's `AckPolicy`.
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

/// Default handler: logs the message metadata after an optional delay
pub struct LoggingHandler {
    processing_delay: Duration,
}

impl LoggingHandler {
    /// Creates a new `LoggingHandler`
    #[must_use]
    pub const fn new(processing_delay: Duration) -> Self {
        Self { processing_delay }
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        let metadata = message.metadata();
        info!(
            message_id = metadata.message_id,
            group_id = metadata.group_id,
            deduplication_id = metadata.deduplication_id,
            approximate_receive_count = metadata.approximate_receive_count,
            body_bytes = message.body.len(),
            "Successfully handled message"
        );

        Ok(())
    }
}
