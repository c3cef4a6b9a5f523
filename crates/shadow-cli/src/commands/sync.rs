//! Sync command - Force a one-off sync of a shadow against the cloud
//!
//! Builds a standalone `SyncHandler` over the real local store and
//! cloud HTTP data plane and drives a single `FullSync` execution. This
//! bypasses the daemon entirely, there is no IPC transport to a
//! running instance for operator diagnostics; running this while the
//! daemon is also syncing the same shadow is safe but redundant, since
//! both converge on the same reconciliation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Subcommand;
use shadow_cloud::http::HttpCloudDataPlane;
use shadow_core::config::Config;
use shadow_core::domain::{PatchState, ShadowError, ShadowKey, ShadowName, ThingName};
use shadow_core::ports::LocalMutator;
use shadow_sync::{Outcome, SyncHandler};
use shadow_store::{DatabasePool, SqliteLocalStore};
use tokio_util::sync::CancellationToken;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Force a full-shadow reconciliation against the cloud
    Force {
        /// The thing name the shadow belongs to
        thing: String,
        /// Named shadow to sync; omit for the classic (unnamed) shadow
        #[arg(long)]
        name: Option<String>,
    },
}

/// The CLI never applies inbound cloud changes itself; `FullSync` never
/// calls through this port, but `SyncHandler::new` still requires one.
struct RefusingMutator;

#[async_trait]
impl LocalMutator for RefusingMutator {
    async fn apply_local_update(&self, _key: &ShadowKey, _version: u64, _patch: &PatchState) -> Result<(), ShadowError> {
        Err(ShadowError::ServiceError("local mutation is not supported from the CLI".into()))
    }

    async fn apply_local_delete(&self, _key: &ShadowKey, _version: u64) -> Result<(), ShadowError> {
        Err(ShadowError::ServiceError("local mutation is not supported from the CLI".into()))
    }
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            SyncCommand::Force { thing, name } => self.execute_force(thing, name.as_deref(), format).await,
        }
    }

    async fn execute_force(&self, thing: &str, name: Option<&str>, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let config = Config::load_or_default(&Config::default_path());

        let db_pool = DatabasePool::new(Path::new(&config.storage.db_path))
            .await
            .context("failed to open local shadow store")?;
        let store: Arc<dyn shadow_core::ports::LocalStore> =
            Arc::new(SqliteLocalStore::new(db_pool.pool().clone(), Some(config.max_disk_utilization_mega_bytes)));
        let cloud: Arc<dyn shadow_core::ports::CloudDataPlane> =
            Arc::new(HttpCloudDataPlane::new(config.cloud.http_base_url.clone(), config.cloud.auth_token.clone()));

        // A one-off invocation has no shutdown signal to observe; a token
        // that is never cancelled keeps the original unbounded-retry behavior.
        let handler = SyncHandler::new(store, cloud, Arc::new(RefusingMutator), CancellationToken::new());

        let thing = ThingName::new(thing).context("invalid thing name")?;
        let shadow = name.map(ShadowName::new).transpose().context("invalid shadow name")?;
        let key = ShadowKey::new(thing, shadow);

        match handler.execute(&key, &shadow_core::domain::SyncRequest::FullSync).await {
            Outcome::Done => {
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({"key": key.to_string(), "status": "synced"}));
                } else {
                    formatter.success(&format!("synced {key}"));
                }
            }
            Outcome::Requeue(next) => {
                // A bare CLI invocation has no queue to requeue into; surface
                // the follow-up the daemon would have performed.
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "key": key.to_string(),
                        "status": "incomplete",
                        "next": next.kind(),
                    }));
                } else {
                    formatter.warn(&format!("{key} needs a follow-up {} sync; run force again", next.kind()));
                }
            }
        }

        Ok(())
    }
}
