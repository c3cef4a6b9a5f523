//! Per-shadow write-lock registry
//!
//! Interns one `Arc<Mutex<()>>` per key so every caller contending for
//! the same shadow — a direct local handler call or the sync handler
//! applying an inbound cloud change — observes the same lock. Entries
//! are never evicted: the cardinality of shadow keys a gateway handles
//! is small and bounded by its configured sync set plus whatever
//! classic/named shadows local callers have touched.

use std::sync::Arc;

use dashmap::DashMap;
use shadow_core::domain::ShadowKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Interned per-key write locks.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<ShadowKey, Arc<Mutex<()>>>,
}

impl LockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// Acquires the write lock for `key`, blocking until available.
    ///
    /// The returned guard owns a clone of the interned `Arc`, so it
    /// stays alive for the guard's lifetime even if another caller looks
    /// the entry up concurrently.
    pub async fn lock(&self, key: &ShadowKey) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        mutex.lock_owned().await
    }

    /// Number of keys with an interned lock. Exposed for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when no key has ever been locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
