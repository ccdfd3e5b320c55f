//! Ordered set of scheduled alerts.
//!
//! Keyed by `(scheduled_unix, token)` ascending, token breaking ties, with
//! a token side-index for removal. The ordering key is a snapshot taken at
//! insertion; callers reschedule by remove-then-reinsert, never by
//! mutating an alert's time while it is a member.

use crate::alert::Alert;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    at: i64,
    token: String,
}

/// Time-ordered, token-unique set of alerts.
#[derive(Default)]
pub(crate) struct ScheduledQueue {
    by_time: BTreeMap<QueueKey, Arc<Alert>>,
    by_token: HashMap<String, QueueKey>,
}

impl ScheduledQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `alert` at its current scheduled time, replacing any member
    /// with the same token.
    pub fn insert(&mut self, alert: Arc<Alert>) {
        self.remove(alert.token());
        let key = QueueKey {
            at: alert.scheduled_unix(),
            token: alert.token().to_owned(),
        };
        self.by_token.insert(key.token.clone(), key.clone());
        self.by_time.insert(key, alert);
    }

    /// Remove and return the member with `token`, if any.
    pub fn remove(&mut self, token: &str) -> Option<Arc<Alert>> {
        let key = self.by_token.remove(token)?;
        self.by_time.remove(&key)
    }

    /// Returns the member with `token`, if any.
    pub fn get(&self, token: &str) -> Option<&Arc<Alert>> {
        let key = self.by_token.get(token)?;
        self.by_time.get(key)
    }

    /// Returns the earliest member without removing it.
    pub fn first(&self) -> Option<&Arc<Alert>> {
        self.by_time.values().next()
    }

    /// Remove and return the earliest member.
    pub fn pop_first(&mut self) -> Option<Arc<Alert>> {
        let key = self.by_time.keys().next()?.clone();
        self.by_token.remove(&key.token);
        self.by_time.remove(&key)
    }

    /// Iterate members in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Alert>> {
        self.by_time.values()
    }

    pub fn len(&self) -> usize {
        self.by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_time.clear();
        self.by_token.clear();
    }
}
