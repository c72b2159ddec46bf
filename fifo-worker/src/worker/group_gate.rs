//! Pool-wide exclusion per message group
//!
//! A worker takes a [`GroupPermit`] before handling a grouped message and
//! drops it after the acknowledge step, so two workers never handle messages
//! of the same group at the same time. Waiters are served in FIFO order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type GroupLocks = HashMap<String, Arc<AsyncMutex<()>>>;

/// Hands out at most one permit per group key at a time
#[derive(Default)]
pub struct GroupGate {
    locks: Arc<Mutex<GroupLocks>>,
}

impl GroupGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locks(locks: &Mutex<GroupLocks>) -> MutexGuard<'_, GroupLocks> {
        locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until no other worker holds `group_id`
    pub async fn acquire(&self, group_id: &str) -> GroupPermit {
        let lock = Self::locks(&self.locks)
            .entry(group_id.to_string())
            .or_default()
            .clone();

        let guard = lock.lock_owned().await;

        GroupPermit {
            group_id: group_id.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Groups that currently have a holder or waiters
    #[must_use]
    pub fn tracked_groups(&self) -> usize {
        Self::locks(&self.locks).len()
    }
}

/// Exclusive right to handle messages of one group, released on drop
pub struct GroupPermit {
    group_id: String,
    locks: Arc<Mutex<GroupLocks>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl GroupPermit {
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

impl Drop for GroupPermit {
    fn drop(&mut self) {
        let mut locks = GroupGate::locks(&self.locks);
        // Map entry plus our guard means nobody else is waiting
        if locks
            .get(&self.group_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            locks.remove(&self.group_id);
        }
        drop(self.guard.take());
    }
}
