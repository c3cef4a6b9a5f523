//! Sync handler — executes a single `SyncRequest` against the cloud
//! data plane and the local store.
//!
//! One `execute()` call per popped request; the worker pool (`pool.rs`)
//! guarantees at most one in-flight call per key. Retryable cloud
//! errors are retried in place via [`crate::retry::with_retry`];
//! terminal errors are logged and the request dropped without blocking
//! the queue; conflicts and stale-version notifications requeue a
//! `FullSync`.

use std::sync::Arc;

use chrono::Utc;
use shadow_core::domain::{document, CloudError, PatchState, ShadowDocument, ShadowKey, SyncInfo, SyncRequest};
use shadow_core::ports::{CloudDataPlane, LocalMutator, LocalStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::merge::reconcile;
use crate::queue::SyncQueues;
use crate::retry::with_retry;

/// Outcome of executing a request: either it is done (success or
/// dropped) or it must be requeued as a different request kind.
pub enum Outcome {
    /// The request completed (successfully or was dropped); pop it.
    Done,
    /// Replace the request with a fresh one for the same key.
    Requeue(SyncRequest),
}

/// Executes sync requests against the cloud data plane and local store.
pub struct SyncHandler {
    store: Arc<dyn LocalStore>,
    cloud: Arc<dyn CloudDataPlane>,
    mutator: Arc<dyn LocalMutator>,
    cancellation: CancellationToken,
}

impl SyncHandler {
    /// Creates a handler over the given collaborators. `cancellation`
    /// is observed between retry attempts so a shutdown in progress
    /// cuts a stuck backoff loop short rather than letting it sleep out
    /// its full delay; pass a token that is never cancelled (e.g. a
    /// fresh [`CancellationToken::new`]) for one-off, non-daemon use.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, cloud: Arc<dyn CloudDataPlane>, mutator: Arc<dyn LocalMutator>, cancellation: CancellationToken) -> Self {
        Self { store, cloud, mutator, cancellation }
    }

    fn should_stop(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Executes `request` for `key`, returning whether it is done or
    /// must be requeued under a different kind.
    pub async fn execute(&self, key: &ShadowKey, request: &SyncRequest) -> Outcome {
        let result = match request {
            SyncRequest::CloudUpdate { patch } => self.cloud_update(key, patch).await,
            SyncRequest::CloudDelete => self.cloud_delete(key).await,
            SyncRequest::LocalUpdate { version, patch } => self.local_update(key, *version, patch).await,
            SyncRequest::LocalDelete { version } => self.local_delete(key, *version).await,
            SyncRequest::FullSync => self.full_sync(key).await,
            SyncRequest::OverwriteCloud => self.overwrite_cloud(key).await,
            SyncRequest::OverwriteLocal => self.overwrite_local(key).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(key = %key, kind = request.kind(), error = %err, "sync request failed");
                Outcome::Done
            }
        }
    }

    async fn cloud_update(&self, key: &ShadowKey, patch: &PatchState) -> anyhow::Result<Outcome> {
        let Some(local) = self.store.get(key).await? else {
            return Ok(Outcome::Done);
        };
        let sync_info = self.store.get_sync_info(key).await?;
        let local_bytes = document::to_json(&local, false);

        if let Some(info) = &sync_info {
            if info.last_synced_document.as_deref() == Some(local_bytes.as_slice()) {
                return Ok(Outcome::Done);
            }
        }

        let should_stop = || self.should_stop();
        let result = with_retry("cloud_update", should_stop, || {
            let cloud = self.cloud.clone();
            let key = key.clone();
            let body = local_bytes.clone();
            async move { cloud.update_document(&key, &body).await }
        })
        .await;

        match result {
            Ok(cloud_doc) => {
                self.record_sync(key, &local, cloud_doc.version, cloud_doc.update_time, Some(local_bytes)).await?;
                Ok(Outcome::Done)
            }
            Err(CloudError::Conflict) => Ok(Outcome::Requeue(SyncRequest::FullSync)),
            Err(err) if err.is_terminal() => {
                warn!(key = %key, error = %err, "dropping terminal cloud_update failure");
                let _ = patch;
                Ok(Outcome::Done)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn cloud_delete(&self, key: &ShadowKey) -> anyhow::Result<Outcome> {
        let should_stop = || self.should_stop();
        let result = with_retry("cloud_delete", should_stop, || {
            let cloud = self.cloud.clone();
            let key = key.clone();
            async move { cloud.delete_document(&key).await }
        })
        .await;

        match result {
            Ok(version) => {
                let mut info = self.store.get_sync_info(key).await?.unwrap_or_else(|| SyncInfo::first_sync(Utc::now().timestamp()));
                info.key = Some(key.clone());
                info.cloud_version = version;
                info.cloud_deleted = true;
                info.last_synced_document = None;
                info.last_sync_time = Utc::now().timestamp();
                self.store.update_sync_info(key, &info).await?;
                Ok(Outcome::Done)
            }
            Err(err) if err.is_terminal() => Ok(Outcome::Done),
            Err(err) => Err(err.into()),
        }
    }

    async fn local_update(&self, key: &ShadowKey, cloud_version: u64, patch: &PatchState) -> anyhow::Result<Outcome> {
        let info = self.store.get_sync_info(key).await?;
        let known = info.as_ref().map_or(0, |i| i.cloud_version);

        if cloud_version <= known {
            return Ok(Outcome::Done);
        }
        if cloud_version > known + 1 {
            return Ok(Outcome::Requeue(SyncRequest::FullSync));
        }

        self.mutator.apply_local_update(key, cloud_version, patch).await?;

        let mut info = info.unwrap_or_else(|| SyncInfo::first_sync(Utc::now().timestamp()));
        info.key = Some(key.clone());
        info.cloud_version = cloud_version;
        info.last_sync_time = Utc::now().timestamp();
        if let Some(doc) = self.store.get(key).await? {
            info.local_version = doc.version;
        }
        self.store.update_sync_info(key, &info).await?;
        Ok(Outcome::Done)
    }

    async fn local_delete(&self, key: &ShadowKey, version: u64) -> anyhow::Result<Outcome> {
        let info = self.store.get_sync_info(key).await?;
        let known = info.as_ref().map_or(0, |i| i.cloud_version);

        if version < known {
            return Ok(Outcome::Requeue(SyncRequest::FullSync));
        }

        self.mutator.apply_local_delete(key, version).await?;

        let mut info = info.unwrap_or_else(|| SyncInfo::first_sync(Utc::now().timestamp()));
        info.key = Some(key.clone());
        info.cloud_version = version;
        info.cloud_deleted = true;
        info.last_synced_document = None;
        info.last_sync_time = Utc::now().timestamp();
        self.store.update_sync_info(key, &info).await?;
        Ok(Outcome::Done)
    }

    async fn full_sync(&self, key: &ShadowKey) -> anyhow::Result<Outcome> {
        let now = Utc::now().timestamp();
        let should_stop = || self.should_stop();
        let cloud_doc = with_retry("full_sync_get", should_stop, || {
            let cloud = self.cloud.clone();
            let key = key.clone();
            async move { cloud.get_document(&key).await }
        })
        .await;

        let cloud_doc = match cloud_doc {
            Ok(doc) => Some(doc),
            Err(CloudError::NotFound) => None,
            Err(err) if err.is_terminal() => None,
            Err(err) => return Err(err.into()),
        };

        let local_doc = self.store.get(key).await?;
        let prior_info = self.store.get_sync_info(key).await?;
        let is_first_sync = prior_info.is_none();

        match (&local_doc, &cloud_doc) {
            (None, None) => Ok(Outcome::Done),
            (None, Some(cloud)) => {
                let parsed = document::parse(&cloud.bytes)?;
                self.store.update(key, &parsed, 0).await?;
                self.record_sync(key, &parsed, cloud.version, cloud.update_time, Some(cloud.bytes.clone())).await?;
                Ok(Outcome::Done)
            }
            (Some(local), None) => {
                let bytes = document::to_json(local, false);
                let pushed = self.push_to_cloud(key, &bytes).await?;
                self.record_sync(key, local, pushed.0, pushed.1, Some(bytes)).await?;
                Ok(Outcome::Done)
            }
            (Some(local), Some(cloud)) => {
                let cloud_parsed = document::parse(&cloud.bytes)?;

                if is_first_sync {
                    let merged = reconcile(None, local, &cloud_parsed, local.version.max(cloud_parsed.version) + 1, now);
                    self.write_both(key, &merged).await?;
                    return Ok(Outcome::Done);
                }

                let info = prior_info.expect("checked above");
                let last_synced = info
                    .last_synced_document
                    .as_deref()
                    .map(document::parse)
                    .transpose()?;

                let local_bytes = document::to_json(local, false);
                let local_changed = last_synced.as_ref().map_or(true, |s| document::to_json(s, false) != local_bytes);
                let cloud_changed = last_synced.as_ref().map_or(true, |s| document::to_json(s, false) != cloud.bytes);

                match (local_changed, cloud_changed) {
                    (false, false) => Ok(Outcome::Done),
                    (true, false) => {
                        let pushed = self.push_to_cloud(key, &local_bytes).await?;
                        self.record_sync(key, local, pushed.0, pushed.1, Some(local_bytes)).await?;
                        Ok(Outcome::Done)
                    }
                    (false, true) => {
                        self.store.update(key, &cloud_parsed, local.version).await?;
                        self.record_sync(key, &cloud_parsed, cloud.version, cloud.update_time, Some(cloud.bytes.clone())).await?;
                        Ok(Outcome::Done)
                    }
                    (true, true) => {
                        let merged = reconcile(last_synced.as_ref(), local, &cloud_parsed, local.version.max(cloud_parsed.version) + 1, now);
                        self.write_both(key, &merged).await?;
                        Ok(Outcome::Done)
                    }
                }
            }
        }
    }

    async fn overwrite_cloud(&self, key: &ShadowKey) -> anyhow::Result<Outcome> {
        let Some(local) = self.store.get(key).await? else {
            return Ok(Outcome::Done);
        };
        let bytes = document::to_json(&local, false);
        let pushed = self.push_to_cloud(key, &bytes).await?;
        self.record_sync(key, &local, pushed.0, pushed.1, Some(bytes)).await?;
        Ok(Outcome::Done)
    }

    async fn overwrite_local(&self, key: &ShadowKey) -> anyhow::Result<Outcome> {
        let should_stop = || self.should_stop();
        let cloud_doc = with_retry("overwrite_local_get", should_stop, || {
            let cloud = self.cloud.clone();
            let key = key.clone();
            async move { cloud.get_document(&key).await }
        })
        .await;

        let cloud_doc = match cloud_doc {
            Ok(doc) => doc,
            Err(CloudError::NotFound) => return Ok(Outcome::Done),
            Err(err) if err.is_terminal() => return Ok(Outcome::Done),
            Err(err) => return Err(err.into()),
        };

        let parsed = document::parse(&cloud_doc.bytes)?;
        let current_version = self.store.get(key).await?.map_or(0, |d| d.version);
        self.store.update(key, &parsed, current_version).await?;
        self.record_sync(key, &parsed, cloud_doc.version, cloud_doc.update_time, Some(cloud_doc.bytes)).await?;
        Ok(Outcome::Done)
    }

    async fn push_to_cloud(&self, key: &ShadowKey, bytes: &[u8]) -> anyhow::Result<(u64, i64)> {
        let should_stop = || self.should_stop();
        let doc = with_retry("push_to_cloud", should_stop, || {
            let cloud = self.cloud.clone();
            let key = key.clone();
            let bytes = bytes.to_vec();
            async move { cloud.update_document(&key, &bytes).await }
        })
        .await?;
        Ok((doc.version, doc.update_time))
    }

    async fn write_both(&self, key: &ShadowKey, merged: &ShadowDocument) -> anyhow::Result<()> {
        let current_version = self.store.get(key).await?.map_or(0, |d| d.version);
        self.store.update(key, merged, current_version).await?;
        let bytes = document::to_json(merged, false);
        let pushed = self.push_to_cloud(key, &bytes).await?;
        self.record_sync(key, merged, pushed.0, pushed.1, Some(bytes)).await?;
        Ok(())
    }

    async fn record_sync(
        &self,
        key: &ShadowKey,
        document: &ShadowDocument,
        cloud_version: u64,
        cloud_update_time: i64,
        last_synced_document: Option<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let info = SyncInfo {
            key: Some(key.clone()),
            cloud_version,
            local_version: document.version,
            last_synced_document,
            cloud_update_time,
            last_sync_time: Utc::now().timestamp(),
            cloud_deleted: false,
        };
        self.store.update_sync_info(key, &info).await?;
        debug!(key = %key, cloud_version, local_version = document.version, "sync bookkeeping updated");
        Ok(())
    }
}

/// Enqueues `request` for `key` respecting the configured direction policy.
pub fn enqueue(queues: &SyncQueues, key: &ShadowKey, request: SyncRequest) -> bool {
    queues.offer(key, request)
}
