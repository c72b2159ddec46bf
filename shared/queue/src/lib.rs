//! Queue contract and adapters for the FIFO worker
//!
//! This crate provides the [`QueueClient`] contract consumed by the worker
//! pool, the message data model, an SQS-backed client and an in-memory queue.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

use std::time::Duration;

use async_trait::async_trait;

/// Error types for queue operations
pub mod error;
/// In-memory queue with FIFO group semantics
pub mod memory;
/// SQS-backed queue client
pub mod sqs_queue;
/// Common types for queue operations
pub mod types;

pub use error::{QueueError, QueueResult};
pub use memory::InMemoryQueue;
pub use sqs_queue::SqsQueueClient;
pub use types::{Message, MessageMetadata, QueueConfig};

/// Receive and acknowledge operations against a message queue
///
/// Implementations must be safe for uncoordinated concurrent use; workers
/// share one client without any locking around it.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-polls for up to `max_messages` messages
    ///
    /// Blocks up to `wait_time` for at least one message and returns an empty
    /// vector when none arrived. Each returned message is hidden from other
    /// consumers for the queue's visibility window.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the backend could not be reached or rejected
    /// the request
    async fn receive(&self, max_messages: i32, wait_time: Duration) -> QueueResult<Vec<Message>>;

    /// Permanently removes the message leased under `receipt_handle`
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the delete failed. A stale or already deleted
    /// receipt handle yields [`QueueError::StaleReceiptHandle`] where the
    /// backend reports it; callers should not treat it as fatal.
    async fn delete(&self, receipt_handle: &str) -> QueueResult<()>;
}
