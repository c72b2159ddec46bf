//! Error taxonomy of the worker

use std::time::Duration;

use queue::QueueError;
use thiserror::Error;

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised while building or running the worker pool
///
/// Only construction errors are fatal. Receive errors are retried after a
/// backoff, handle and delete errors are reported and the loop moves on.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// `APP_ENV` holds an unknown value
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Required configuration is missing
    #[error("{0} environment variable is not set")]
    MissingConfig(&'static str),

    /// A configuration value is out of range
    #[error("Invalid {key}: {reason}")]
    InvalidConfig {
        /// Environment variable name
        key: &'static str,
        /// What is wrong with the value
        reason: String,
    },

    /// Long-poll receive failed
    #[error("Failed to receive messages: {0}")]
    Receive(#[source] QueueError),

    /// The message handler returned an error
    #[error("Message handler failed: {0:#}")]
    Handle(anyhow::Error),

    /// The message handler did not finish within its deadline
    #[error("Message handler timed out after {0:?}")]
    HandlerTimeout(Duration),

    /// Deleting a handled message failed
    #[error("Failed to delete message: {0}")]
    Delete(#[source] QueueError),

    /// `start` was called on a pool that already ran
    #[error("Worker pool was already started")]
    AlreadyStarted,
}

impl WorkerError {
    /// Whether the error aborts startup
    #[must_use]
    pub const fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEnvironment(_) | Self::MissingConfig(_) | Self::InvalidConfig { .. }
        )
    }

    /// Whether the error came from the message handler
    #[must_use]
    pub const fn is_handle_error(&self) -> bool {
        matches!(self, Self::Handle(_) | Self::HandlerTimeout(_))
    }
}
