//! Per-shadow sync bookkeeping
//!
//! `SyncInfo` records what the sync handler last knew about a shadow's
//! cloud-side state. It exists only for shadows in the configured sync
//! set, is created on first sync, and is never zero-valued on the wire
//! (absence is the sentinel for "never synced" — see the design note in
//! the specification about not relying on a wire-visible zero version).

use serde::{Deserialize, Serialize};

use super::newtypes::ShadowKey;

/// Per-shadow sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncInfo {
    /// The shadow this bookkeeping describes.
    #[serde(skip)]
    pub key: Option<ShadowKey>,
    /// Last cloud-side version observed.
    pub cloud_version: u64,
    /// Last local-side version observed.
    pub local_version: u64,
    /// Bytes of the document as of the last successful sync; `None`
    /// when the last sync step was a delete.
    pub last_synced_document: Option<Vec<u8>>,
    /// Cloud-reported update time of the last sync, seconds since epoch.
    pub cloud_update_time: i64,
    /// Wall-clock time this bookkeeping was last updated, seconds since epoch.
    pub last_sync_time: i64,
    /// Whether the cloud side has tombstoned this shadow.
    pub cloud_deleted: bool,
}

impl SyncInfo {
    /// Creates bookkeeping for a shadow's very first sync.
    #[must_use]
    pub fn first_sync(now: i64) -> Self {
        Self {
            key: None,
            cloud_version: 0,
            local_version: 0,
            last_synced_document: None,
            cloud_update_time: now,
            last_sync_time: now,
            cloud_deleted: false,
        }
    }
}
