//! In-memory FIFO queue
//!
//! Mirrors the SQS FIFO behaviour the worker relies on:
//! - receipt handles are leases that expire after the visibility timeout
//! - a message group with an in-flight message is not delivered again until
//!   that message is deleted or its lease expires
//! - receive long-polls up to the requested wait time
//!
//! Used by tests and for running the worker without a queue backend.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use crate::{
    error::{QueueError, QueueResult},
    types::{Message, APPROXIMATE_RECEIVE_COUNT, MESSAGE_DEDUPLICATION_ID, MESSAGE_GROUP_ID},
    QueueClient,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    sequence: u64,
    message_id: String,
    group_id: Option<String>,
    deduplication_id: Option<String>,
    body: String,
    receive_count: u32,
}

impl StoredMessage {
    fn to_delivery(&self, receipt_handle: String) -> Message {
        let mut attributes = HashMap::from([(
            APPROXIMATE_RECEIVE_COUNT.to_string(),
            self.receive_count.to_string(),
        )]);
        if let Some(group_id) = &self.group_id {
            attributes.insert(MESSAGE_GROUP_ID.to_string(), group_id.clone());
        }
        if let Some(dedup_id) = &self.deduplication_id {
            attributes.insert(MESSAGE_DEDUPLICATION_ID.to_string(), dedup_id.clone());
        }

        Message {
            message_id: self.message_id.clone(),
            group_id: self.group_id.clone(),
            deduplication_id: self.deduplication_id.clone(),
            receipt_handle,
            attributes,
            message_attributes: HashMap::new(),
            body: self.body.clone(),
        }
    }
}

struct InFlight {
    message: StoredMessage,
    lease_expires_at: Instant,
}

#[derive(Default)]
struct State {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlight>,
    deleted: Vec<String>,
    receive_failures: u32,
    receive_calls: u64,
    next_sequence: u64,
}

impl State {
    /// Returns expired leases to the pending queue in their original order
    fn expire_leases(&mut self, now: Instant) {
        let expired = self
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.lease_expires_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect::<Vec<_>>();

        if expired.is_empty() {
            return;
        }

        for handle in expired {
            if let Some(lease) = self.in_flight.remove(&handle) {
                self.pending.push_back(lease.message);
            }
        }
        self.pending
            .make_contiguous()
            .sort_by_key(|message| message.sequence);
    }

    fn lease(&mut self, max_messages: usize, visibility_timeout: Duration) -> Vec<Message> {
        let mut blocked = self
            .in_flight
            .values()
            .filter_map(|lease| lease.message.group_id.clone())
            .collect::<HashSet<_>>();

        let now = Instant::now();
        let mut leased = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.pending.len());

        while let Some(mut message) = self.pending.pop_front() {
            let group_open = message
                .group_id
                .as_ref()
                .is_none_or(|group| !blocked.contains(group));

            if leased.len() < max_messages && group_open {
                message.receive_count += 1;
                let receipt_handle = Uuid::new_v4().to_string();
                leased.push(message.to_delivery(receipt_handle.clone()));
                self.in_flight.insert(
                    receipt_handle,
                    InFlight {
                        message,
                        lease_expires_at: now + visibility_timeout,
                    },
                );
            } else {
                // Later messages of a skipped group must wait behind it
                if let Some(group) = &message.group_id {
                    blocked.insert(group.clone());
                }
                remaining.push_back(message);
            }
        }

        self.pending = remaining;
        leased
    }

    fn next_lease_expiry(&self) -> Option<Instant> {
        self.in_flight
            .values()
            .map(|lease| lease.lease_expires_at)
            .min()
    }
}

/// FIFO queue held in process memory
pub struct InMemoryQueue {
    state: Mutex<State>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl InMemoryQueue {
    /// Creates an empty queue whose leases last `visibility_timeout`
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a message and returns its message id
    pub fn send(&self, group_id: Option<&str>, body: impl Into<String>) -> String {
        let message_id = Uuid::new_v4().to_string();
        {
            let mut state = self.state();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.pending.push_back(StoredMessage {
                sequence,
                message_id: message_id.clone(),
                group_id: group_id.map(ToString::to_string),
                deduplication_id: Some(format!("dedup-{sequence}")),
                body: body.into(),
                receive_count: 0,
            });
        }
        self.notify.notify_waiters();
        message_id
    }

    /// Makes the next `count` receive calls fail with [`QueueError::Unavailable`]
    pub fn fail_next_receives(&self, count: u32) {
        self.state().receive_failures = count;
    }

    /// Messages waiting to be received
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Messages currently leased to a consumer, including expired leases not
    /// yet reclaimed
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    /// Ids of deleted messages, in deletion order
    #[must_use]
    pub fn deleted_message_ids(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    /// Total number of receive calls, including failed ones
    #[must_use]
    pub fn receive_calls(&self) -> u64 {
        self.state().receive_calls
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive(&self, max_messages: i32, wait_time: Duration) -> QueueResult<Vec<Message>> {
        let max_messages = usize::try_from(max_messages.max(1)).unwrap_or(1);
        let deadline = Instant::now() + wait_time;

        {
            let mut state = self.state();
            state.receive_calls += 1;
            if state.receive_failures > 0 {
                state.receive_failures -= 1;
                return Err(QueueError::Unavailable(
                    "injected receive failure".to_string(),
                ));
            }
        }

        loop {
            // Registered before inspecting state so a concurrent send is not missed
            let notified = self.notify.notified();

            let wake_at = {
                let mut state = self.state();
                state.expire_leases(Instant::now());
                let leased = state.lease(max_messages, self.visibility_timeout);
                if !leased.is_empty() {
                    return Ok(leased);
                }
                state
                    .next_lease_expiry()
                    .map_or(deadline, |expiry| expiry.min(deadline))
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            tokio::select! {
                () = notified => {}
                () = sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        {
            let mut state = self.state();
            state.expire_leases(Instant::now());
            let lease = state
                .in_flight
                .remove(receipt_handle)
                .ok_or(QueueError::StaleReceiptHandle)?;
            state.deleted.push(lease.message.message_id);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
