//! Cloud data-plane port (driven/secondary port)
//!
//! This module defines the interface for the HTTP calls the sync
//! handler makes against the cloud shadow service: get/update/delete a
//! shadow document. The MQTT transport used for inbound notifications
//! and publish fan-out is a separate port (see `shadow-cloud`'s
//! `CloudDataClient`); this one is the synchronous request/response
//! half of the cloud relationship.
//!
//! ## Design Notes
//!
//! - Returns `Result<T, CloudError>` rather than `anyhow::Result`,
//!   because the sync handler's retry/backoff policy matches on the
//!   specific `CloudError` variant (§7).

use crate::domain::errors::CloudError;
use crate::domain::newtypes::ShadowKey;

/// A cloud-side shadow document as returned by `get_document`.
#[derive(Debug, Clone)]
pub struct CloudDocument {
    /// Raw document bytes, in the same wire shape as the local store's.
    pub bytes: Vec<u8>,
    /// The cloud-assigned version.
    pub version: u64,
    /// Seconds since epoch the cloud side last updated this document.
    pub update_time: i64,
}

/// Port trait for the cloud shadow service's HTTP data plane.
#[async_trait::async_trait]
pub trait CloudDataPlane: Send + Sync {
    /// Fetches the current cloud-side document for `key`.
    ///
    /// # Errors
    /// Returns `CloudError::NotFound` when the cloud side has no
    /// document for this key; other variants per the error taxonomy.
    async fn get_document(&self, key: &ShadowKey) -> Result<CloudDocument, CloudError>;

    /// Applies `patch_bytes` (a full document or patch, per the
    /// underlying transport's convention) to the cloud-side document.
    ///
    /// # Errors
    /// Returns `CloudError::Conflict` on a version mismatch; other
    /// variants per the error taxonomy.
    async fn update_document(
        &self,
        key: &ShadowKey,
        patch_bytes: &[u8],
    ) -> Result<CloudDocument, CloudError>;

    /// Deletes the cloud-side document for `key`.
    ///
    /// # Errors
    /// Per the error taxonomy; absence of a prior document is not an
    /// error (create-then-delete is valid).
    async fn delete_document(&self, key: &ShadowKey) -> Result<u64, CloudError>;
}
