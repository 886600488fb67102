//! Work that cannot be applied yet and is retried on later ticks.
//!
//! Typical items are a teleport waiting for the actor's transform to become
//! readable, or an inventory write waiting for a free slot. Each item carries
//! an expiry; items still unresolved at expiry are dropped with a warning.

use std::fmt::Display;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;

/// Default lifetime of a deferred item.
pub const DEFAULT_DEFERRED_EXPIRY_SECS: i64 = 45;

/// Result of one attempt at a deferred item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Done,
    Retry,
    Abandon(String),
}

#[derive(Debug, Clone)]
struct Entry<T> {
    item: T,
    queued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

/// Counts from one [`DeferredQueue::process`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub done: usize,
    pub retried: usize,
    pub abandoned: usize,
    pub expired: usize,
}

/// Keyed retry queue. One item per key; queueing again replaces it.
#[derive(Debug, Clone)]
pub struct DeferredQueue<K, T> {
    label: &'static str,
    ttl: Duration,
    entries: HashMap<K, Entry<T>>,
}

impl<K, T> DeferredQueue<K, T>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new(label: &'static str) -> Self {
        Self::with_ttl(label, Duration::seconds(DEFAULT_DEFERRED_EXPIRY_SECS))
    }

    pub fn with_ttl(label: &'static str, ttl: Duration) -> Self {
        Self {
            label,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Queue `item` under `key`, replacing anything already queued for it.
    pub fn push(&mut self, key: K, item: T, now: DateTime<Utc>) -> Option<T> {
        let previous = self.entries.insert(
            key,
            Entry {
                item,
                queued_at: now,
                expires_at: now + self.ttl,
                attempts: 0,
            },
        );
        previous.map(|entry| entry.item)
    }

    pub fn remove(&mut self, key: &K) -> Option<T> {
        self.entries.remove(key).map(|entry| entry.item)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Try every live item once. Expired items are dropped without an
    /// attempt.
    pub fn process(
        &mut self,
        now: DateTime<Utc>,
        mut attempt: impl FnMut(&K, &mut T) -> Attempt,
    ) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        let label = self.label;

        self.entries.retain(|key, entry| {
            if now >= entry.expires_at {
                summary.expired += 1;
                tracing::warn!(
                    queue = label,
                    key = %key,
                    attempts = entry.attempts,
                    waited_ms = (now - entry.queued_at).num_milliseconds(),
                    "Deferred work timed out"
                );
                return false;
            }

            entry.attempts += 1;
            match attempt(key, &mut entry.item) {
                Attempt::Done => {
                    summary.done += 1;
                    false
                }
                Attempt::Retry => {
                    summary.retried += 1;
                    true
                }
                Attempt::Abandon(reason) => {
                    summary.abandoned += 1;
                    tracing::warn!(queue = label, key = %key, reason = %reason, "Deferred work abandoned");
                    false
                }
            }
        });

        summary
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
