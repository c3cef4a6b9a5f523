//! Shadow command - Inspect shadow documents in the local store
//!
//! Provides the `shadow-manager-cli shadow` CLI command which:
//! 1. Fetches and prints a single shadow document (`get`)
//! 2. Lists the named shadows registered for a thing (`list`)
//!
//! Both operate directly against the local SQLite store; there is no
//! live-daemon IPC transport for operator diagnostics.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use shadow_core::config::Config;
use shadow_core::domain::{document, ShadowKey, ShadowName, ThingName};
use shadow_core::ports::LocalStore;
use shadow_store::{DatabasePool, SqliteLocalStore};

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ShadowCommand {
    /// Print a single shadow document
    Get {
        /// The thing name the shadow belongs to
        thing: String,
        /// Named shadow to fetch; omit for the classic (unnamed) shadow
        #[arg(long)]
        name: Option<String>,
    },
    /// List the named shadows registered for a thing
    List {
        /// The thing name to list named shadows for
        thing: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

impl ShadowCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            ShadowCommand::Get { thing, name } => self.execute_get(thing, name.as_deref(), format).await,
            ShadowCommand::List { thing, offset, limit } => self.execute_list(thing, *offset, *limit, format).await,
        }
    }

    async fn execute_get(&self, thing: &str, name: Option<&str>, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let store = open_store().await?;

        let thing = ThingName::new(thing).context("invalid thing name")?;
        let shadow = name.map(ShadowName::new).transpose().context("invalid shadow name")?;
        let key = ShadowKey::new(thing, shadow);

        match store.get(&key).await? {
            Some(doc) => {
                let bytes = document::to_json(&doc, true);
                let value: serde_json::Value = serde_json::from_slice(&bytes)?;
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&value);
                } else {
                    formatter.success(&format!("shadow {key}"));
                    let yaml = serde_yaml::to_string(&value).context("failed to render shadow as YAML")?;
                    for line in yaml.lines() {
                        formatter.info(line);
                    }
                }
            }
            None => {
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({"found": false, "key": key.to_string()}));
                } else {
                    formatter.warn(&format!("no shadow document for {key}"));
                }
            }
        }

        Ok(())
    }

    async fn execute_list(&self, thing: &str, offset: usize, limit: usize, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let store = open_store().await?;

        let thing = ThingName::new(thing).context("invalid thing name")?;
        let names = store.list_named(&thing, offset, limit).await?;

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({"thing": thing.as_str(), "namedShadows": names}));
        } else if names.is_empty() {
            formatter.info(&format!("no named shadows for {thing}"));
        } else {
            formatter.success(&format!("named shadows for {thing}"));
            for name in &names {
                formatter.info(&format!("  {name}"));
            }
        }

        Ok(())
    }
}

async fn open_store() -> Result<SqliteLocalStore> {
    let config = Config::load_or_default(&Config::default_path());
    let db_pool = DatabasePool::new(Path::new(&config.storage.db_path))
        .await
        .context("failed to open local shadow store")?;
    Ok(SqliteLocalStore::new(db_pool.pool().clone(), Some(config.max_disk_utilization_mega_bytes)))
}
