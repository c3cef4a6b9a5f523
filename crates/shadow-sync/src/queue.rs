//! Per-shadow FIFO sync request queues
//!
//! One queue per `(thing, shadow)` key in the configured sync set.
//! Queues are mutually independent; the worker pool (`pool.rs`) enforces
//! at most one in-flight worker per key, not this module.

use std::collections::{HashSet, VecDeque};
use std::sync::RwLock;

use dashmap::DashMap;
use shadow_core::domain::{Direction, ShadowKey, SyncRequest};

/// Holds one FIFO queue per shadow key and applies the merge-on-enqueue
/// and direction-gating rules of the sync request taxonomy.
///
/// `direction` is behind a `RwLock` rather than a plain field so the
/// config reconciliation task can retarget it through a shared `Arc`
/// without requiring exclusive access to the whole pool.
#[derive(Default)]
pub struct SyncQueues {
    queues: DashMap<ShadowKey, VecDeque<SyncRequest>>,
    direction: RwLock<Direction>,
}

impl SyncQueues {
    /// Creates an empty set of queues under the given direction policy.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self { queues: DashMap::new(), direction: RwLock::new(direction) }
    }

    /// Current direction policy.
    #[must_use]
    pub fn direction(&self) -> Direction {
        *self.direction.read().expect("direction lock poisoned")
    }

    /// Replaces the direction policy. Already-queued requests are left
    /// untouched; gating only applies at enqueue time.
    pub fn set_direction(&self, direction: Direction) {
        *self.direction.write().expect("direction lock poisoned") = direction;
    }

    /// Offers `request` for `key`. Drops the request if the current
    /// direction policy disallows it; otherwise merges it onto the
    /// queue's tail entry or appends it.
    ///
    /// Returns `true` if the request was queued (merged or appended),
    /// `false` if it was dropped by direction gating.
    pub fn offer(&self, key: &ShadowKey, request: SyncRequest) -> bool {
        if !self.direction().allows(&request) {
            return false;
        }

        let mut queue = self.queues.entry(key.clone()).or_default();
        if let Some(tail) = queue.back() {
            if let Some(merged) = tail.merge_onto(&request) {
                *queue.back_mut().expect("checked above") = merged;
                return true;
            }
        }
        queue.push_back(request);
        true
    }

    /// Pops the head request for `key`, if any.
    pub fn pop(&self, key: &ShadowKey) -> Option<SyncRequest> {
        self.queues.get_mut(key).and_then(|mut q| q.pop_front())
    }

    /// Keys with at least one queued request.
    #[must_use]
    pub fn ready_keys(&self) -> HashSet<ShadowKey> {
        self.queues
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// True if `key` has no pending requests.
    #[must_use]
    pub fn is_empty(&self, key: &ShadowKey) -> bool {
        self.queues.get(key).is_none_or(|q| q.is_empty())
    }
}
