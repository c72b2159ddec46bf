use std::time::Duration;

use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::operation::delete_message::DeleteMessageError;
use aws_sdk_sqs::operation::receive_message::ReceiveMessageError;
use thiserror::Error;

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Error types for queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    /// Error receiving messages from SQS
    #[error("Failed to receive messages from SQS")]
    ReceiveMessage(#[from] SdkError<ReceiveMessageError>),

    /// Error deleting message from SQS
    #[error("Failed to delete message from SQS")]
    DeleteMessage(#[from] SdkError<DeleteMessageError>),

    /// The operation did not complete within its bound
    #[error("Queue {operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Bound that was exceeded
        after: Duration,
    },

    /// The receipt handle no longer identifies a leased message
    #[error("Receipt handle is stale or already deleted")]
    StaleReceiptHandle,

    /// Backend is unreachable or refused the request
    #[error("Queue backend unavailable: {0}")]
    Unavailable(String),
}

impl QueueError {
    /// Checks if this error represents an upstream (5xx) error
    #[must_use]
    pub fn is_upstream_error(&self) -> bool {
        match self {
            Self::ReceiveMessage(sdk_err) => Self::check_sdk_error_status(sdk_err),
            Self::DeleteMessage(sdk_err) => Self::check_sdk_error_status(sdk_err),
            _ => false,
        }
    }

    fn check_sdk_error_status<E>(sdk_err: &SdkError<E>) -> bool {
        if let SdkError::ServiceError(err) = sdk_err {
            let raw = err.raw();
            let status = raw.status();
            return status.as_u16() >= 500;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_classification() {
        assert!(!QueueError::StaleReceiptHandle.is_upstream_error());
        assert!(!QueueError::Timeout {
            operation: "receive",
            after: Duration::from_secs(25),
        }
        .is_upstream_error());
    }

    #[test]
    fn test_timeout_display() {
        let err = QueueError::Timeout {
            operation: "delete",
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "Queue delete timed out after 10s");
    }
}
