//! Local request-handler surface
//!
//! [`ShadowRequestHandlers`] implements the four local operations
//! (`UpdateThingShadow`, `GetThingShadow`, `DeleteThingShadow`,
//! `ListNamedShadowsForThing`) and the [`LocalMutator`] port consumed
//! by the sync handler for inbound cloud changes — the same validated,
//! locked, published code path serves both callers.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use shadow_core::domain::{document, PatchState, ShadowDocument, ShadowError, ShadowKey, ThingName, UpdatePayload};
use shadow_core::ports::{Authorizer, LocalMutator, LocalStore, Publisher, PublishTopic, ShadowOperation};
use shadow_sync::LockRegistry;
use tokio::sync::mpsc;
use tracing::warn;

use crate::pagination;
use crate::rate_limit::InboundRateLimiter;

const DEFAULT_PAGE_SIZE: usize = 25;
const MAX_PAGE_SIZE: usize = 100;

/// A page of named shadows for `ListNamedShadowsForThing`.
#[derive(Debug, Clone)]
pub struct NamedShadowsPage {
    /// Shadow names on this page.
    pub results: Vec<String>,
    /// Opaque token for the next page, present only when this page was full.
    pub next_token: Option<String>,
}

/// Implements the four local shadow operations plus the sync handler's
/// `LocalMutator` port.
pub struct ShadowRequestHandlers {
    store: Arc<dyn LocalStore>,
    locks: Arc<LockRegistry>,
    rate_limiter: Arc<InboundRateLimiter>,
    authorizer: Arc<dyn Authorizer>,
    publisher: Arc<dyn Publisher>,
    sync_tx: mpsc::Sender<(ShadowKey, shadow_core::domain::SyncRequest)>,
    max_document_size_bytes: usize,
}

impl ShadowRequestHandlers {
    /// Creates a new handler surface over the given collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LocalStore>,
        locks: Arc<LockRegistry>,
        rate_limiter: Arc<InboundRateLimiter>,
        authorizer: Arc<dyn Authorizer>,
        publisher: Arc<dyn Publisher>,
        sync_tx: mpsc::Sender<(ShadowKey, shadow_core::domain::SyncRequest)>,
        max_document_size_bytes: usize,
    ) -> Self {
        Self { store, locks, rate_limiter, authorizer, publisher, sync_tx, max_document_size_bytes }
    }

    async fn gate(&self, caller: &str, key: &ShadowKey) -> Result<(), ShadowError> {
        if !self.rate_limiter.try_acquire(key.thing.as_str()) {
            return Err(ShadowError::Throttled);
        }
        self.authorizer.authorize(caller, key).await.map_err(|()| ShadowError::Unauthorized)
    }

    async fn publish_rejected(&self, key: &ShadowKey, op: ShadowOperation, err: &ShadowError, client_token: Option<&str>) {
        let mut body = json!({ "code": err.code(), "message": err.to_string(), "timestamp": Utc::now().timestamp() });
        if let (Value::Object(ref mut map), Some(token)) = (&mut body, client_token) {
            map.insert("clientToken".to_string(), json!(token));
        }
        if let Err(publish_err) = self.publisher.publish(key, op, PublishTopic::Rejected, &body).await {
            warn!(key = %key, error = %publish_err, "failed to publish rejected");
        }
    }

    /// `UpdateThingShadow`: validates, merges, persists, publishes, and
    /// enqueues a `CloudUpdate` sync request. Returns the accepted
    /// document bytes on success.
    pub async fn update_thing_shadow(&self, caller: &str, key: &ShadowKey, payload: &[u8]) -> Result<Vec<u8>, ShadowError> {
        let result = self.update_inner(caller, key, payload).await;
        if let Err(ref err) = result {
            let client_token = parse_client_token(payload);
            self.publish_rejected(key, ShadowOperation::Update, err, client_token.as_deref()).await;
        }
        result
    }

    async fn update_inner(&self, caller: &str, key: &ShadowKey, payload: &[u8]) -> Result<Vec<u8>, ShadowError> {
        self.gate(caller, key).await?;

        if payload.len() > self.max_document_size_bytes {
            return Err(ShadowError::PayloadTooLarge { size: payload.len(), limit: self.max_document_size_bytes });
        }

        let request: UpdatePayload =
            serde_json::from_slice(payload).map_err(|e| ShadowError::InvalidPayload(e.to_string()))?;

        let _guard = self.locks.lock(key).await;

        let current = self.store.get(key).await.map_err(|e| ShadowError::ServiceError(e.to_string()))?;
        let version = document::validate_patch_version(current.as_ref(), request.version)?;
        let now = Utc::now().timestamp();
        let base = current.clone().unwrap_or_else(|| ShadowDocument::new_empty(now));

        let outcome = document::merge(&base, &request.state, version, now, document::DEFAULT_MAX_DEPTH)?;

        let expected = current.as_ref().map_or(0, |d| d.version);
        let persisted = self.store.update(key, &outcome.document, expected).await.map_err(|e| ShadowError::ServiceError(e.to_string()))?;
        if persisted.is_none() {
            return Err(ShadowError::VersionConflict { expected: version, actual: version });
        }

        self.publish_update_side_effects(key, &outcome.document, &current, request.client_token.as_deref()).await;

        let _ = self.sync_tx.try_send((key.clone(), shadow_core::domain::SyncRequest::CloudUpdate { patch: request.state }));

        Ok(document::to_json(&outcome.document, true))
    }

    async fn publish_update_side_effects(
        &self,
        key: &ShadowKey,
        document: &ShadowDocument,
        previous: &Option<ShadowDocument>,
        client_token: Option<&str>,
    ) {
        let accepted = with_client_token(parse_document_value(document, true), client_token);
        if let Err(err) = self.publisher.publish(key, ShadowOperation::Update, PublishTopic::Accepted, &accepted).await {
            warn!(key = %key, error = %err, "failed to publish accepted");
        }

        if let Some((state, metadata)) = shadow_core::domain::document::delta(document) {
            let body = with_client_token(
                json!({ "state": state, "metadata": metadata, "version": document.version, "timestamp": document.timestamp }),
                client_token,
            );
            if let Err(err) = self.publisher.publish(key, ShadowOperation::Update, PublishTopic::Delta, &body).await {
                warn!(key = %key, error = %err, "failed to publish delta");
            }
        }

        let previous_value = previous.as_ref().map(|d| parse_document_value(d, true)).unwrap_or(Value::Null);
        let documents_body = with_client_token(
            json!({ "previous": previous_value, "current": parse_document_value(document, true), "timestamp": document.timestamp }),
            client_token,
        );
        if let Err(err) = self.publisher.publish(key, ShadowOperation::Update, PublishTopic::Documents, &documents_body).await {
            warn!(key = %key, error = %err, "failed to publish documents");
        }
    }

    /// `DeleteThingShadow`: soft-deletes the shadow and enqueues a `CloudDelete`.
    pub async fn delete_thing_shadow(&self, caller: &str, key: &ShadowKey, client_token: Option<&str>) -> Result<Vec<u8>, ShadowError> {
        let result = self.delete_inner(caller, key).await;
        if let Err(ref err) = result {
            self.publish_rejected(key, ShadowOperation::Delete, err, client_token).await;
        }
        result
    }

    async fn delete_inner(&self, caller: &str, key: &ShadowKey) -> Result<Vec<u8>, ShadowError> {
        self.gate(caller, key).await?;

        let _guard = self.locks.lock(key).await;

        let deleted = self
            .store
            .delete(key)
            .await
            .map_err(|e| ShadowError::ServiceError(e.to_string()))?
            .ok_or(ShadowError::ResourceNotFound)?;

        let version = deleted.version + 1;
        let timestamp = Utc::now().timestamp();
        let accepted = json!({ "version": version, "timestamp": timestamp });
        if let Err(err) = self.publisher.publish(key, ShadowOperation::Delete, PublishTopic::Accepted, &accepted).await {
            warn!(key = %key, error = %err, "failed to publish delete accepted");
        }

        let _ = self.sync_tx.try_send((key.clone(), shadow_core::domain::SyncRequest::CloudDelete));

        Ok(serde_json::to_vec(&accepted).unwrap_or_default())
    }

    /// `GetThingShadow`: returns the current document, computed delta included.
    pub async fn get_thing_shadow(&self, caller: &str, key: &ShadowKey) -> Result<Vec<u8>, ShadowError> {
        let result = self.get_inner(caller, key).await;
        if let Err(ref err) = result {
            self.publish_rejected(key, ShadowOperation::Get, err, None).await;
        }
        result
    }

    async fn get_inner(&self, caller: &str, key: &ShadowKey) -> Result<Vec<u8>, ShadowError> {
        self.gate(caller, key).await?;

        let document = self.store.get(key).await.map_err(|e| ShadowError::ServiceError(e.to_string()))?.ok_or(ShadowError::ResourceNotFound)?;

        let body = parse_document_value(&document, true);
        if let Err(err) = self.publisher.publish(key, ShadowOperation::Get, PublishTopic::Accepted, &body).await {
            warn!(key = %key, error = %err, "failed to publish get accepted");
        }

        Ok(document::to_json(&document, true))
    }

    /// `ListNamedShadowsForThing`: pages named shadows, optionally
    /// resuming from an opaque `next_token`.
    pub async fn list_named_shadows(
        &self,
        caller: &str,
        thing: &ThingName,
        page_size: Option<usize>,
        next_token: Option<&str>,
    ) -> Result<NamedShadowsPage, ShadowError> {
        let classic = ShadowKey::classic(thing.clone());
        self.gate(caller, &classic).await?;

        let offset = match next_token {
            Some(token) => pagination::decode(token, caller, thing.as_str())?,
            None => 0,
        };
        let limit = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let results = self.store.list_named(thing, offset, limit).await.map_err(|e| ShadowError::ServiceError(e.to_string()))?;

        let next_token = if results.len() == limit {
            Some(pagination::encode(caller, thing.as_str(), offset + limit))
        } else {
            None
        };

        Ok(NamedShadowsPage { results, next_token })
    }
}

#[async_trait::async_trait]
impl LocalMutator for ShadowRequestHandlers {
    async fn apply_local_update(&self, key: &ShadowKey, version: u64, patch: &PatchState) -> Result<(), ShadowError> {
        let _guard = self.locks.lock(key).await;

        let current = self.store.get(key).await.map_err(|e| ShadowError::ServiceError(e.to_string()))?;
        let now = Utc::now().timestamp();
        let base = current.clone().unwrap_or_else(|| ShadowDocument::new_empty(now));
        let outcome = document::merge(&base, patch, version, now, document::DEFAULT_MAX_DEPTH)?;

        let expected = current.as_ref().map_or(0, |d| d.version);
        let persisted = self.store.update(key, &outcome.document, expected).await.map_err(|e| ShadowError::ServiceError(e.to_string()))?;
        if persisted.is_none() {
            return Err(ShadowError::VersionConflict { expected: version, actual: version });
        }

        self.publish_update_side_effects(key, &outcome.document, &current, None).await;
        Ok(())
    }

    async fn apply_local_delete(&self, key: &ShadowKey, version: u64) -> Result<(), ShadowError> {
        let _guard = self.locks.lock(key).await;

        self.store.delete(key).await.map_err(|e| ShadowError::ServiceError(e.to_string()))?;

        let accepted = json!({ "version": version, "timestamp": Utc::now().timestamp() });
        if let Err(err) = self.publisher.publish(key, ShadowOperation::Delete, PublishTopic::Accepted, &accepted).await {
            warn!(key = %key, error = %err, "failed to publish delete accepted");
        }
        Ok(())
    }
}

fn parse_document_value(document: &ShadowDocument, include_metadata: bool) -> Value {
    serde_json::from_slice(&document::to_json(document, include_metadata)).unwrap_or(Value::Null)
}

fn with_client_token(mut body: Value, client_token: Option<&str>) -> Value {
    if let (Value::Object(ref mut map), Some(token)) = (&mut body, client_token) {
        map.insert("clientToken".to_string(), json!(token));
    }
    body
}

fn parse_client_token(payload: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    value.get("clientToken")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use shadow_core::domain::{ShadowName, SyncInfo};

    use super::*;

    #[derive(Default)]
    struct FakeStore {
        documents: StdMutex<HashMap<ShadowKey, ShadowDocument>>,
        sync_info: StdMutex<HashMap<ShadowKey, SyncInfo>>,
    }

    #[async_trait::async_trait]
    impl LocalStore for FakeStore {
        async fn get(&self, key: &ShadowKey) -> anyhow::Result<Option<ShadowDocument>> {
            Ok(self.documents.lock().unwrap().get(key).cloned())
        }

        async fn update(&self, key: &ShadowKey, document: &ShadowDocument, expected_version: u64) -> anyhow::Result<Option<Vec<u8>>> {
            let mut documents = self.documents.lock().unwrap();
            let current = documents.get(key).map_or(0, |d| d.version);
            if current != expected_version {
                return Ok(None);
            }
            documents.insert(key.clone(), document.clone());
            Ok(Some(document::to_json(document, false)))
        }

        async fn delete(&self, key: &ShadowKey) -> anyhow::Result<Option<ShadowDocument>> {
            Ok(self.documents.lock().unwrap().remove(key))
        }

        async fn list_named(&self, thing: &ThingName, offset: usize, limit: usize) -> anyhow::Result<Vec<String>> {
            let documents = self.documents.lock().unwrap();
            let mut names: Vec<String> = documents
                .keys()
                .filter(|k| &k.thing == thing && !k.is_classic())
                .map(ShadowKey::shadow_name_str)
                .map(str::to_string)
                .collect();
            names.sort();
            Ok(names.into_iter().skip(offset).take(limit).collect())
        }

        async fn get_sync_info(&self, key: &ShadowKey) -> anyhow::Result<Option<SyncInfo>> {
            Ok(self.sync_info.lock().unwrap().get(key).cloned())
        }

        async fn update_sync_info(&self, key: &ShadowKey, info: &SyncInfo) -> anyhow::Result<()> {
            self.sync_info.lock().unwrap().insert(key.clone(), info.clone());
            Ok(())
        }

        async fn delete_sync_info(&self, key: &ShadowKey) -> anyhow::Result<()> {
            self.sync_info.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_synced(&self) -> anyhow::Result<Vec<ShadowKey>> {
            Ok(self.sync_info.lock().unwrap().keys().cloned().collect())
        }

        async fn get_deleted_version(&self, _key: &ShadowKey) -> anyhow::Result<Option<u64>> {
            Ok(None)
        }
    }

    struct AllowAuthorizer;

    #[async_trait::async_trait]
    impl Authorizer for AllowAuthorizer {
        async fn authorize(&self, _caller: &str, _key: &ShadowKey) -> Result<(), ()> {
            Ok(())
        }
    }

    struct DenyAuthorizer;

    #[async_trait::async_trait]
    impl Authorizer for DenyAuthorizer {
        async fn authorize(&self, _caller: &str, _key: &ShadowKey) -> Result<(), ()> {
            Err(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: StdMutex<Vec<(ShadowKey, ShadowOperation, PublishTopic)>>,
    }

    #[async_trait::async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, key: &ShadowKey, operation: ShadowOperation, topic: PublishTopic, _body: &Value) -> anyhow::Result<()> {
            self.published.lock().unwrap().push((key.clone(), operation, topic));
            Ok(())
        }
    }

    fn thing(name: &str) -> ThingName {
        ThingName::new(name).unwrap()
    }

    fn handlers(authorizer: Arc<dyn Authorizer>) -> (ShadowRequestHandlers, Arc<RecordingPublisher>, mpsc::Receiver<(ShadowKey, shadow_core::domain::SyncRequest)>) {
        let (tx, rx) = mpsc::channel(16);
        let publisher = Arc::new(RecordingPublisher::default());
        let handlers = ShadowRequestHandlers::new(
            Arc::new(FakeStore::default()),
            Arc::new(LockRegistry::new()),
            Arc::new(InboundRateLimiter::new(100, 100)),
            authorizer,
            publisher.clone(),
            tx,
            64 * 1024,
        );
        (handlers, publisher, rx)
    }

    #[tokio::test]
    async fn test_update_creates_shadow_and_publishes_accepted() {
        let (handlers, publisher, mut rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));

        let body = serde_json::to_vec(&serde_json::json!({ "state": { "reported": { "on": true } } })).unwrap();
        let result = handlers.update_thing_shadow("caller", &key, &body).await;
        assert!(result.is_ok());

        let published = publisher.published.lock().unwrap();
        assert!(published.iter().any(|(_, op, topic)| *op == ShadowOperation::Update && *topic == PublishTopic::Accepted));

        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_update_rejects_wrong_version() {
        let (handlers, publisher, _rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));

        let body = serde_json::to_vec(&serde_json::json!({ "version": 5, "state": { "reported": { "on": true } } })).unwrap();
        let result = handlers.update_thing_shadow("caller", &key, &body).await;
        assert!(matches!(result, Err(ShadowError::VersionConflict { .. })));

        let published = publisher.published.lock().unwrap();
        assert!(published.iter().any(|(_, _, topic)| *topic == PublishTopic::Rejected));
    }

    #[tokio::test]
    async fn test_unauthorized_caller_rejected() {
        let (handlers, publisher, _rx) = handlers(Arc::new(DenyAuthorizer));
        let key = ShadowKey::classic(thing("T1"));

        let body = serde_json::to_vec(&serde_json::json!({ "state": { "reported": { "on": true } } })).unwrap();
        let result = handlers.update_thing_shadow("caller", &key, &body).await;
        assert_eq!(result.unwrap_err(), ShadowError::Unauthorized);

        let published = publisher.published.lock().unwrap();
        assert!(published.iter().any(|(_, _, topic)| *topic == PublishTopic::Rejected));
    }

    #[tokio::test]
    async fn test_payload_too_large_rejected() {
        let (handlers, _publisher, _rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));
        let body = vec![b'a'; 128 * 1024];

        let result = handlers.update_thing_shadow("caller", &key, &body).await;
        assert!(matches!(result, Err(ShadowError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_get_missing_shadow_returns_not_found() {
        let (handlers, _publisher, _rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));

        let result = handlers.get_thing_shadow("caller", &key).await;
        assert_eq!(result.unwrap_err(), ShadowError::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_get_after_update_returns_document() {
        let (handlers, _publisher, _rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));
        let body = serde_json::to_vec(&serde_json::json!({ "state": { "reported": { "on": true } } })).unwrap();
        handlers.update_thing_shadow("caller", &key, &body).await.unwrap();

        let result = handlers.get_thing_shadow("caller", &key).await.unwrap();
        let value: Value = serde_json::from_slice(&result).unwrap();
        assert_eq!(value["state"]["reported"]["on"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_delete_missing_shadow_returns_not_found() {
        let (handlers, _publisher, _rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));

        let result = handlers.delete_thing_shadow("caller", &key, None).await;
        assert_eq!(result.unwrap_err(), ShadowError::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_delete_existing_shadow_enqueues_cloud_delete() {
        let (handlers, _publisher, mut rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));
        let body = serde_json::to_vec(&serde_json::json!({ "state": { "reported": { "on": true } } })).unwrap();
        handlers.update_thing_shadow("caller", &key, &body).await.unwrap();
        let _ = rx.try_recv();

        let result = handlers.delete_thing_shadow("caller", &key, None).await;
        assert!(result.is_ok());
        let (_, request) = rx.try_recv().unwrap();
        assert!(matches!(request, shadow_core::domain::SyncRequest::CloudDelete));
    }

    #[tokio::test]
    async fn test_list_named_shadows_pages_with_next_token() {
        let (handlers, _publisher, _rx) = handlers(Arc::new(AllowAuthorizer));
        let t = thing("T1");
        for name in ["alpha", "beta", "gamma"] {
            let key = ShadowKey::new(t.clone(), Some(ShadowName::new(name).unwrap()));
            let body = serde_json::to_vec(&serde_json::json!({ "state": { "reported": { "x": 1 } } })).unwrap();
            handlers.update_thing_shadow("caller", &key, &body).await.unwrap();
        }

        let page = handlers.list_named_shadows("caller", &t, Some(2), None).await.unwrap();
        assert_eq!(page.results, vec!["alpha".to_string(), "beta".to_string()]);
        assert!(page.next_token.is_some());

        let next = handlers.list_named_shadows("caller", &t, Some(2), page.next_token.as_deref()).await.unwrap();
        assert_eq!(next.results, vec!["gamma".to_string()]);
        assert!(next.next_token.is_none());
    }

    #[tokio::test]
    async fn test_apply_local_update_skips_cloud_update_enqueue() {
        let (handlers, _publisher, mut rx) = handlers(Arc::new(AllowAuthorizer));
        let key = ShadowKey::classic(thing("T1"));
        let patch = PatchState { reported: Some(serde_json::json!({ "on": true })), desired: None };

        handlers.apply_local_update(&key, 1, &patch).await.unwrap();
        assert!(rx.try_recv().is_err());

        let fetched = handlers.get_thing_shadow("caller", &key).await.unwrap();
        let value: Value = serde_json::from_slice(&fetched).unwrap();
        assert_eq!(value["state"]["reported"]["on"], serde_json::json!(true));
    }
}
