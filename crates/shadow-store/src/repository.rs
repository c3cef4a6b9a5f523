//! SQLite implementation of `LocalStore`
//!
//! Two tables back this adapter: `documents` holds the current shadow
//! document bytes (soft-deleted in place so a resurrection can continue
//! from the tombstoned version) and `sync_info` holds the per-shadow
//! cloud-sync bookkeeping described in [`shadow_core::domain::SyncInfo`].
//!
//! ## Type mapping
//!
//! | Domain type     | SQL type | Strategy                        |
//! |-----------------|----------|----------------------------------|
//! | ThingName        | TEXT     | `as_str()` / `ThingName::new()` |
//! | ShadowName        | TEXT     | `as_str()`, `""` for classic     |
//! | ShadowDocument    | BLOB     | `document::to_json` / `document::parse` |
//! | SyncInfo          | columns  | one column per field             |

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use shadow_core::domain::{document, ShadowDocument, ShadowKey, ShadowName, StoreError, SyncInfo, ThingName};
use shadow_core::ports::LocalStore;

/// SQLite-backed implementation of the [`LocalStore`] port.
pub struct SqliteLocalStore {
    pool: SqlitePool,
    max_disk_utilization_bytes: Option<u64>,
}

impl SqliteLocalStore {
    /// Creates a repository over an already-migrated pool.
    ///
    /// `max_disk_utilization_mega_bytes` enforces `maxDiskUtilizationMegaBytes`
    /// opportunistically before each write; `None` disables the check (used
    /// by tests against an in-memory pool).
    #[must_use]
    pub fn new(pool: SqlitePool, max_disk_utilization_mega_bytes: Option<u64>) -> Self {
        Self {
            pool,
            max_disk_utilization_bytes: max_disk_utilization_mega_bytes.map(|mb| mb * 1024 * 1024),
        }
    }

    async fn check_quota(&self) -> Result<(), StoreError> {
        let Some(limit) = self.max_disk_utilization_bytes else {
            return Ok(());
        };
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::DataError(e.to_string()))?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::DataError(e.to_string()))?;
        let used = (page_count * page_size).max(0) as u64;
        if used >= limit {
            return Err(StoreError::QuotaExceeded);
        }
        Ok(())
    }
}

fn document_from_row(row: &SqliteRow) -> anyhow::Result<Option<ShadowDocument>> {
    let deleted: i64 = row.try_get("deleted")?;
    if deleted != 0 {
        return Ok(None);
    }
    let body: Vec<u8> = row.try_get("body")?;
    Ok(Some(document::parse(&body)?))
}

fn sync_info_from_row(row: &SqliteRow) -> anyhow::Result<SyncInfo> {
    let last_synced_document: Option<Vec<u8>> = row.try_get("last_synced_document")?;
    Ok(SyncInfo {
        key: None,
        cloud_version: row.try_get::<i64, _>("cloud_version")? as u64,
        local_version: row.try_get::<i64, _>("local_version")? as u64,
        last_synced_document,
        cloud_update_time: row.try_get("cloud_update_time")?,
        last_sync_time: row.try_get("last_sync_time")?,
        cloud_deleted: row.try_get::<i64, _>("cloud_deleted")? != 0,
    })
}

fn shadow_name_str(key: &ShadowKey) -> &str {
    key.shadow_name_str()
}

#[async_trait::async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self, key: &ShadowKey) -> anyhow::Result<Option<ShadowDocument>> {
        let row = sqlx::query("SELECT body, deleted FROM documents WHERE thing_name = ? AND shadow_name = ?")
            .bind(key.thing.as_str())
            .bind(shadow_name_str(key))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => document_from_row(r),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        key: &ShadowKey,
        document: &ShadowDocument,
        expected_version: u64,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        self.check_quota().await?;

        let existing: Option<(i64, i64)> =
            sqlx::query_as("SELECT version, deleted FROM documents WHERE thing_name = ? AND shadow_name = ?")
                .bind(key.thing.as_str())
                .bind(shadow_name_str(key))
                .fetch_optional(&self.pool)
                .await?;

        let current_version = match existing {
            Some((v, deleted)) if deleted == 0 => v as u64,
            _ => 0,
        };
        if current_version != expected_version {
            return Err(StoreError::DataError(format!(
                "expected version {expected_version}, store has {current_version}"
            ))
            .into());
        }

        let body = document::to_json(document, true);

        sqlx::query(
            "INSERT INTO documents (thing_name, shadow_name, version, body, deleted, update_time) \
             VALUES (?, ?, ?, ?, 0, ?) \
             ON CONFLICT(thing_name, shadow_name) DO UPDATE SET \
             version = excluded.version, body = excluded.body, deleted = 0, update_time = excluded.update_time",
        )
        .bind(key.thing.as_str())
        .bind(shadow_name_str(key))
        .bind(document.version as i64)
        .bind(&body)
        .bind(document.timestamp)
        .execute(&self.pool)
        .await?;

        tracing::trace!(key = %key, version = document.version, "wrote shadow document");
        Ok(Some(body))
    }

    async fn delete(&self, key: &ShadowKey) -> anyhow::Result<Option<ShadowDocument>> {
        let row = sqlx::query("SELECT body, deleted FROM documents WHERE thing_name = ? AND shadow_name = ?")
            .bind(key.thing.as_str())
            .bind(shadow_name_str(key))
            .fetch_optional(&self.pool)
            .await?;

        let existing = match &row {
            Some(r) => document_from_row(r)?,
            None => return Ok(None),
        };
        let Some(existing) = existing else {
            return Ok(None);
        };

        sqlx::query(
            "UPDATE documents SET deleted = 1, version = ?, update_time = ? \
             WHERE thing_name = ? AND shadow_name = ?",
        )
        .bind((existing.version + 1) as i64)
        .bind(existing.timestamp)
        .bind(key.thing.as_str())
        .bind(shadow_name_str(key))
        .execute(&self.pool)
        .await?;

        tracing::trace!(key = %key, "deleted shadow document");
        Ok(Some(existing))
    }

    async fn list_named(&self, thing: &ThingName, offset: usize, limit: usize) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT shadow_name FROM documents \
             WHERE thing_name = ? AND shadow_name != '' AND deleted = 0 \
             ORDER BY shadow_name ASC LIMIT ? OFFSET ?",
        )
        .bind(thing.as_str())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("shadow_name").map_err(anyhow::Error::from))
            .collect()
    }

    async fn get_sync_info(&self, key: &ShadowKey) -> anyhow::Result<Option<SyncInfo>> {
        let row = sqlx::query("SELECT * FROM sync_info WHERE thing_name = ? AND shadow_name = ?")
            .bind(key.thing.as_str())
            .bind(shadow_name_str(key))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => {
                let mut info = sync_info_from_row(r)?;
                info.key = Some(key.clone());
                Ok(Some(info))
            }
            None => Ok(None),
        }
    }

    async fn update_sync_info(&self, key: &ShadowKey, info: &SyncInfo) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sync_info \
             (thing_name, shadow_name, cloud_version, local_version, last_synced_document, \
              cloud_update_time, last_sync_time, cloud_deleted) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(thing_name, shadow_name) DO UPDATE SET \
             cloud_version = excluded.cloud_version, \
             local_version = excluded.local_version, \
             last_synced_document = excluded.last_synced_document, \
             cloud_update_time = excluded.cloud_update_time, \
             last_sync_time = excluded.last_sync_time, \
             cloud_deleted = excluded.cloud_deleted",
        )
        .bind(key.thing.as_str())
        .bind(shadow_name_str(key))
        .bind(info.cloud_version as i64)
        .bind(info.local_version as i64)
        .bind(&info.last_synced_document)
        .bind(info.cloud_update_time)
        .bind(info.last_sync_time)
        .bind(info.cloud_deleted as i64)
        .execute(&self.pool)
        .await?;

        tracing::trace!(key = %key, "updated sync bookkeeping");
        Ok(())
    }

    async fn delete_sync_info(&self, key: &ShadowKey) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_info WHERE thing_name = ? AND shadow_name = ?")
            .bind(key.thing.as_str())
            .bind(shadow_name_str(key))
            .execute(&self.pool)
            .await?;

        tracing::trace!(key = %key, "deleted sync bookkeeping");
        Ok(())
    }

    async fn list_synced(&self) -> anyhow::Result<Vec<ShadowKey>> {
        let rows = sqlx::query("SELECT thing_name, shadow_name FROM sync_info")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| {
                let thing: String = r.try_get("thing_name")?;
                let shadow: String = r.try_get("shadow_name")?;
                let thing = ThingName::new(thing).map_err(|e| anyhow::anyhow!(e))?;
                let shadow = ShadowName::parse_optional(&shadow).map_err(|e| anyhow::anyhow!(e))?;
                Ok(ShadowKey::new(thing, shadow))
            })
            .collect()
    }

    async fn get_deleted_version(&self, key: &ShadowKey) -> anyhow::Result<Option<u64>> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT version, deleted FROM documents WHERE thing_name = ? AND shadow_name = ?")
                .bind(key.thing.as_str())
                .bind(shadow_name_str(key))
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((version, deleted)) if deleted != 0 => Some(version as u64),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabasePool;

    async fn store() -> SqliteLocalStore {
        let pool = DatabasePool::in_memory().await.unwrap();
        SqliteLocalStore::new(pool.pool().clone(), None)
    }

    fn key(thing: &str) -> ShadowKey {
        ShadowKey::classic(ThingName::new(thing).unwrap())
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = store().await;
        assert_eq!(store.get(&key("T1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_then_get_roundtrips() {
        let store = store().await;
        let k = key("T1");
        let doc = ShadowDocument::new_empty(100);
        store.update(&k, &doc, 0).await.unwrap();

        let fetched = store.get(&k).await.unwrap().unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.timestamp, 100);
    }

    #[tokio::test]
    async fn test_update_rejects_wrong_expected_version() {
        let store = store().await;
        let k = key("T1");
        let doc = ShadowDocument::new_empty(100);
        store.update(&k, &doc, 0).await.unwrap();

        let doc2 = ShadowDocument { version: 2, ..doc };
        assert!(store.update(&k, &doc2, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_then_get_returns_none() {
        let store = store().await;
        let k = key("T1");
        let doc = ShadowDocument::new_empty(100);
        store.update(&k, &doc, 0).await.unwrap();

        let deleted = store.delete(&k).await.unwrap();
        assert!(deleted.is_some());
        assert_eq!(store.get(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_records_tombstoned_version() {
        let store = store().await;
        let k = key("T1");
        let doc = ShadowDocument::new_empty(100);
        store.update(&k, &doc, 0).await.unwrap();
        store.delete(&k).await.unwrap();

        assert_eq!(store.get_deleted_version(&k).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_delete_missing_returns_none() {
        let store = store().await;
        assert_eq!(store.delete(&key("T1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_named_excludes_classic_and_deleted() {
        let store = store().await;
        let thing = ThingName::new("T1").unwrap();
        let classic = ShadowKey::classic(thing.clone());
        let named_a = ShadowKey::new(thing.clone(), Some(ShadowName::new("a").unwrap()));
        let named_b = ShadowKey::new(thing.clone(), Some(ShadowName::new("b").unwrap()));

        store.update(&classic, &ShadowDocument::new_empty(1), 0).await.unwrap();
        store.update(&named_a, &ShadowDocument::new_empty(1), 0).await.unwrap();
        store.update(&named_b, &ShadowDocument::new_empty(1), 0).await.unwrap();
        store.delete(&named_b).await.unwrap();

        let names = store.list_named(&thing, 0, 10).await.unwrap();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_list_named_respects_offset_and_limit() {
        let store = store().await;
        let thing = ThingName::new("T1").unwrap();
        for n in ["a", "b", "c"] {
            let k = ShadowKey::new(thing.clone(), Some(ShadowName::new(n).unwrap()));
            store.update(&k, &ShadowDocument::new_empty(1), 0).await.unwrap();
        }

        let page = store.list_named(&thing, 1, 1).await.unwrap();
        assert_eq!(page, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_sync_info_roundtrip() {
        let store = store().await;
        let k = key("T1");
        let mut info = SyncInfo::first_sync(100);
        info.cloud_version = 3;
        info.local_version = 2;
        store.update_sync_info(&k, &info).await.unwrap();

        let fetched = store.get_sync_info(&k).await.unwrap().unwrap();
        assert_eq!(fetched.cloud_version, 3);
        assert_eq!(fetched.local_version, 2);
        assert_eq!(fetched.key, Some(k));
    }

    #[tokio::test]
    async fn test_get_sync_info_missing_returns_none() {
        let store = store().await;
        assert_eq!(store.get_sync_info(&key("T1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_sync_info_removes_row() {
        let store = store().await;
        let k = key("T1");
        store.update_sync_info(&k, &SyncInfo::first_sync(1)).await.unwrap();
        store.delete_sync_info(&k).await.unwrap();
        assert_eq!(store.get_sync_info(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_synced_returns_all_keys() {
        let store = store().await;
        let thing = ThingName::new("T1").unwrap();
        let classic = ShadowKey::classic(thing.clone());
        let named = ShadowKey::new(thing.clone(), Some(ShadowName::new("cfg").unwrap()));
        store.update_sync_info(&classic, &SyncInfo::first_sync(1)).await.unwrap();
        store.update_sync_info(&named, &SyncInfo::first_sync(1)).await.unwrap();

        let mut keys = store.list_synced().await.unwrap();
        keys.sort_by_key(|k| k.to_string());
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_quota_enforced_when_configured() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = SqliteLocalStore::new(pool.pool().clone(), Some(0));
        let doc = ShadowDocument::new_empty(1);
        let err = store.update(&key("T1"), &doc, 0).await.unwrap_err();
        assert!(err.to_string().contains("disk quota"));
    }
}
