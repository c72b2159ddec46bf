use std::collections::HashMap;
use std::time::Duration;

/// System attribute carrying the FIFO message group
pub const MESSAGE_GROUP_ID: &str = "MessageGroupId";
/// System attribute carrying the FIFO deduplication id
pub const MESSAGE_DEDUPLICATION_ID: &str = "MessageDeduplicationId";
/// System attribute counting deliveries of a message
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// A single delivery of a queue message
///
/// The receipt handle is the lease token for this delivery only. It goes stale
/// once the visibility window expires or the message is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Message ID
    pub message_id: String,
    /// Ordering partition key
    pub group_id: Option<String>,
    /// Deduplication ID assigned on send
    pub deduplication_id: Option<String>,
    /// Receipt handle for acknowledging the message
    pub receipt_handle: String,
    /// System attributes, including the approximate receive count
    pub attributes: HashMap<String, String>,
    /// User message attributes with string values
    pub message_attributes: HashMap<String, String>,
    /// The message body, forwarded untouched
    pub body: String,
}

impl Message {
    /// Number of times the queue has delivered this message, if reported
    #[must_use]
    pub fn approximate_receive_count(&self) -> Option<u32> {
        self.attributes
            .get(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|v| v.parse().ok())
    }

    /// Extracts the metadata used for logging and routing
    #[must_use]
    pub fn metadata(&self) -> MessageMetadata<'_> {
        MessageMetadata {
            message_id: &self.message_id,
            group_id: self.group_id.as_deref(),
            deduplication_id: self.deduplication_id.as_deref(),
            receipt_handle: &self.receipt_handle,
            approximate_receive_count: self.approximate_receive_count().unwrap_or_default(),
        }
    }
}

/// Borrowed view over the identifying fields of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMetadata<'a> {
    /// Message ID
    pub message_id: &'a str,
    /// Ordering partition key
    pub group_id: Option<&'a str>,
    /// Deduplication ID
    pub deduplication_id: Option<&'a str>,
    /// Receipt handle of this delivery
    pub receipt_handle: &'a str,
    /// Delivery count, zero when absent or unparsable
    pub approximate_receive_count: u32,
}

/// Configuration for queue operations
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue URL
    pub queue_url: String,
    /// Visibility timeout requested for received messages
    pub visibility_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message_with_attributes(attributes: &[(&str, &str)]) -> Message {
        Message {
            message_id: "msg-1".to_string(),
            group_id: Some("orders".to_string()),
            deduplication_id: Some("dedup-1".to_string()),
            receipt_handle: "rh-1".to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_receive_count_parsed() {
        let message = message_with_attributes(&[(APPROXIMATE_RECEIVE_COUNT, "3")]);
        assert_eq!(message.approximate_receive_count(), Some(3));
        assert_eq!(message.metadata().approximate_receive_count, 3);
    }

    #[test]
    fn test_receive_count_defaults_to_zero() {
        let missing = message_with_attributes(&[]);
        assert_eq!(missing.approximate_receive_count(), None);
        assert_eq!(missing.metadata().approximate_receive_count, 0);

        let garbage = message_with_attributes(&[(APPROXIMATE_RECEIVE_COUNT, "many")]);
        assert_eq!(garbage.approximate_receive_count(), None);
        assert_eq!(garbage.metadata().approximate_receive_count, 0);
    }

    #[test]
    fn test_metadata_borrows_identifiers() {
        let message = message_with_attributes(&[]);
        let metadata = message.metadata();
        assert_eq!(metadata.message_id, "msg-1");
        assert_eq!(metadata.group_id, Some("orders"));
        assert_eq!(metadata.deduplication_id, Some("dedup-1"));
        assert_eq!(metadata.receipt_handle, "rh-1");
    }
}
