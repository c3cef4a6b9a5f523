//! Local store port (driven/secondary port)
//!
//! This module defines the interface for persisting shadow documents
//! and sync bookkeeping. Implementations own the embedded SQL store;
//! the domain and use-case layers never see SQL.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because store failures are adapter-specific
//!   (SQLite I/O, disk quota); callers translate failures into
//!   `ShadowError::ServiceError` at the handler boundary.
//! - The store is not transactional across shadows; it is per-row
//!   atomic, matching §4.2's ownership model.
//! - `delete` is a soft-delete: the row is tombstoned, not removed, so
//!   `getDeletedVersion` can recover the version a resurrection should
//!   continue from.

use crate::domain::newtypes::{ShadowKey, ThingName};
use crate::domain::{ShadowDocument, SyncInfo};

/// Port trait for the local shadow document and sync-info store.
#[async_trait::async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns the current document for `key`, excluding soft-deleted
    /// shadows.
    async fn get(&self, key: &ShadowKey) -> anyhow::Result<Option<ShadowDocument>>;

    /// Upserts `document` for `key`, provided `expected_version` still
    /// matches the stored version (optimistic concurrency). Returns the
    /// persisted document's bytes on success, `None` if a concurrent
    /// write already advanced the version past what the caller observed.
    async fn update(
        &self,
        key: &ShadowKey,
        document: &ShadowDocument,
        expected_version: u64,
    ) -> anyhow::Result<Option<Vec<u8>>>;

    /// Soft-deletes the shadow at `key`, returning the document as it
    /// was immediately before the delete (for the `documents` publish).
    async fn delete(&self, key: &ShadowKey) -> anyhow::Result<Option<ShadowDocument>>;

    /// Lists named (non-classic) shadows for `thing`, excluding deleted
    /// shadows, in stable order by name.
    async fn list_named(
        &self,
        thing: &ThingName,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<String>>;

    /// Returns the sync bookkeeping for `key`, if any.
    async fn get_sync_info(&self, key: &ShadowKey) -> anyhow::Result<Option<SyncInfo>>;

    /// Upserts the sync bookkeeping for `key`.
    async fn update_sync_info(&self, key: &ShadowKey, info: &SyncInfo) -> anyhow::Result<()>;

    /// Removes the sync bookkeeping for `key` (only called when the
    /// shadow leaves the configured sync set).
    async fn delete_sync_info(&self, key: &ShadowKey) -> anyhow::Result<()>;

    /// Lists every key currently carrying sync bookkeeping.
    async fn list_synced(&self) -> anyhow::Result<Vec<ShadowKey>>;

    /// Returns the version a tombstoned shadow was deleted at, used to
    /// choose the version a subsequent cloud-delete carries.
    async fn get_deleted_version(&self, key: &ShadowKey) -> anyhow::Result<Option<u64>>;
}
