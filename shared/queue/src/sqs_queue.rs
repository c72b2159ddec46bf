//! SQS implementation of [`QueueClient`]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::operation::delete_message::DeleteMessageError;
use aws_sdk_sqs::types::{Message as SqsMessage, MessageSystemAttributeName};
use aws_sdk_sqs::Client as SqsClient;

use crate::{
    error::{QueueError, QueueResult},
    types::{Message, QueueConfig},
    QueueClient,
};

/// Requests every user message attribute on receive
const ALL_MESSAGE_ATTRIBUTES: &str = "All";

/// Queue client backed by an SQS (FIFO) queue
pub struct SqsQueueClient {
    sqs_client: Arc<SqsClient>,
    config: QueueConfig,
}

impl SqsQueueClient {
    /// Creates a new SQS queue client
    ///
    /// # Arguments
    ///
    /// * `sqs_client` - Pre-configured SQS client
    /// * `config` - Queue configuration including URL and visibility timeout
    #[must_use]
    pub const fn new(sqs_client: Arc<SqsClient>, config: QueueConfig) -> Self {
        Self { sqs_client, config }
    }

    /// Queue URL this client polls
    #[must_use]
    pub fn queue_url(&self) -> &str {
        &self.config.queue_url
    }

    fn parse_message(msg: &SqsMessage) -> Option<Message> {
        let Some(message_id) = msg.message_id() else {
            tracing::error!("Received SQS message without a message id");
            return None;
        };
        let Some(receipt_handle) = msg.receipt_handle() else {
            tracing::error!(message_id, "Received SQS message without a receipt handle");
            return None;
        };

        let attributes: HashMap<String, String> = msg
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let message_attributes = msg
            .message_attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .string_value()
                            .map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Message {
            message_id: message_id.to_string(),
            group_id: attributes
                .get(MessageSystemAttributeName::MessageGroupId.as_str())
                .cloned(),
            deduplication_id: attributes
                .get(MessageSystemAttributeName::MessageDeduplicationId.as_str())
                .cloned(),
            receipt_handle: receipt_handle.to_string(),
            attributes,
            message_attributes,
            body: msg.body().unwrap_or_default().to_string(),
        })
    }
}

fn duration_secs(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive(&self, max_messages: i32, wait_time: Duration) -> QueueResult<Vec<Message>> {
        let result = self
            .sqs_client
            .receive_message()
            .queue_url(&self.config.queue_url)
            .max_number_of_messages(max_messages)
            .visibility_timeout(duration_secs(self.config.visibility_timeout))
            .wait_time_seconds(duration_secs(wait_time))
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .message_attribute_names(ALL_MESSAGE_ATTRIBUTES)
            .send()
            .await?;

        let messages = result
            .messages()
            .iter()
            .filter_map(Self::parse_message)
            .collect::<Vec<_>>();

        tracing::debug!(count = messages.len(), "Received messages from SQS");

        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        let result = self
            .sqs_client
            .delete_message()
            .queue_url(&self.config.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if matches!(
                    err.as_service_error(),
                    Some(DeleteMessageError::ReceiptHandleIsInvalid(_))
                ) =>
            {
                Err(QueueError::StaleReceiptHandle)
            }
            Err(err) => Err(err.into()),
        }
    }
}
