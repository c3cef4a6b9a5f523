//! Config command - View and manage shadow manager configuration
//!
//! Provides the `shadow-manager-cli config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use anyhow::{Context, Result};
use clap::Subcommand;
use shadow_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "synchronize.direction")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format).await,
            ConfigCommand::Set { key, value } => self.execute_set(key, value, format).await,
            ConfigCommand::Validate => self.execute_validate(format).await,
        }
    }

    async fn execute_show(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let config_path = Config::default_path();
        let config = Config::load_or_default(&config_path);

        info!(config_path = %config_path.display(), "showing configuration");

        if matches!(format, OutputFormat::Json) {
            let json = serde_json::to_value(&config).context("failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config).context("failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    async fn execute_set(&self, key: &str, value: &str, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let config_path = Config::default_path();
        let mut config = Config::load_or_default(&config_path);

        info!(key = %key, value = %value, "setting configuration value");

        match apply_config_value(&mut config, key, value) {
            Ok(()) => {
                let validation_errors = config.validate();
                if !validation_errors.is_empty() {
                    let error_msgs: Vec<String> = validation_errors.iter().map(|e| e.to_string()).collect();

                    if matches!(format, OutputFormat::Json) {
                        formatter.print_json(&serde_json::json!({
                            "success": false,
                            "key": key,
                            "value": value,
                            "errors": error_msgs,
                        }));
                    } else {
                        formatter.error(&format!("invalid value for '{}': {}", key, error_msgs.join("; ")));
                    }
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent).context("failed to create configuration directory")?;
                }

                let yaml = serde_yaml::to_string(&config).context("failed to serialize configuration")?;
                std::fs::write(&config_path, &yaml).context("failed to write configuration file")?;

                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "key": key,
                        "value": value,
                        "config_path": config_path.display().to_string(),
                    }));
                } else {
                    formatter.success(&format!("set {} = {}", key, value));
                    formatter.info(&format!("saved to {}", config_path.display()));
                }
            }
            Err(e) => {
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "key": key,
                        "value": value,
                        "error": e.to_string(),
                    }));
                } else {
                    formatter.error(&format!("failed to set '{}': {}", key, e));
                    formatter.info("");
                    formatter.info("supported keys:");
                    formatter.info("  strategy.type                                    - realTime|periodic");
                    formatter.info("  strategy.delay                                   - seconds between periodic dispatch cycles");
                    formatter.info("  synchronize.direction                            - betweenDeviceAndCloud|deviceToCloud|cloudToDevice");
                    formatter.info("  synchronize.maxOutboundSyncUpdatesPerSecond");
                    formatter.info("  synchronize.provideSyncStatus                    - true|false");
                    formatter.info("  synchronize.workerConcurrency");
                    formatter.info("  shadowDocumentSizeLimitBytes");
                    formatter.info("  maxDiskUtilizationMegaBytes");
                    formatter.info("  rateLimits.maxLocalRequestRatePerThing");
                    formatter.info("  rateLimits.maxTotalLocalRequestRate");
                    formatter.info("  logging.level                                    - trace|debug|info|warn|error");
                    formatter.info("  logging.format                                   - pretty|json");
                    formatter.info("  storage.dbPath");
                    formatter.info("  cloud.mqttHost");
                    formatter.info("  cloud.mqttPort");
                    formatter.info("  cloud.clientId");
                    formatter.info("  cloud.httpBaseUrl");
                    formatter.info("  cloud.authToken");
                }
            }
        }

        Ok(())
    }

    async fn execute_validate(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let config_path = Config::default_path();

        let config = match Config::load(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if !config_path.exists() {
                    if matches!(format, OutputFormat::Json) {
                        formatter.print_json(&serde_json::json!({
                            "valid": false,
                            "config_path": config_path.display().to_string(),
                            "errors": ["configuration file not found; using defaults"],
                        }));
                    } else {
                        formatter.info(&format!("configuration file not found at {}", config_path.display()));
                        formatter.info("using default configuration; run 'shadow-manager-cli config set <key> <value>' to create one");
                    }
                    return Ok(());
                }

                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("failed to parse configuration: {}", e)],
                    }));
                } else {
                    formatter.error(&format!("failed to parse configuration: {}", e));
                    formatter.info(&format!("file: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "validating configuration");

        let errors = config.validate();

        if matches!(format, OutputFormat::Json) {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("configuration is valid");
            formatter.info(&format!("file: {}", config_path.display()));
        } else {
            formatter.error(&format!("configuration has {} error{}:", errors.len(), if errors.len() == 1 { "" } else { "s" }));
            formatter.info(&format!("file: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

/// Apply a dot-notation key/value pair to a [`Config`].
///
/// Supported keys:
/// - `strategy.type`, `strategy.delay`
/// - `synchronize.direction`, `synchronize.maxOutboundSyncUpdatesPerSecond`,
///   `synchronize.provideSyncStatus`, `synchronize.workerConcurrency`
/// - `shadowDocumentSizeLimitBytes`, `maxDiskUtilizationMegaBytes`
/// - `rateLimits.maxLocalRequestRatePerThing`, `rateLimits.maxTotalLocalRequestRate`
/// - `logging.level`, `logging.format`
/// - `storage.dbPath`
/// - `cloud.mqttHost`, `cloud.mqttPort`, `cloud.clientId`, `cloud.httpBaseUrl`, `cloud.authToken`
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- strategy ---
        "strategy.type" => {
            config.strategy.kind = value.to_string();
        }
        "strategy.delay" => {
            config.strategy.delay = value.parse::<u64>().context("expected a positive integer for strategy.delay")?;
        }

        // --- synchronize ---
        "synchronize.direction" => {
            config.synchronize.direction = value.to_string();
        }
        "synchronize.maxOutboundSyncUpdatesPerSecond" => {
            config.synchronize.max_outbound_sync_updates_per_second = value
                .parse::<u32>()
                .context("expected a positive integer for synchronize.maxOutboundSyncUpdatesPerSecond")?;
        }
        "synchronize.provideSyncStatus" => {
            config.synchronize.provide_sync_status =
                value.parse::<bool>().context("expected 'true' or 'false' for synchronize.provideSyncStatus")?;
        }
        "synchronize.workerConcurrency" => {
            config.synchronize.worker_concurrency = value
                .parse::<usize>()
                .context("expected a positive integer for synchronize.workerConcurrency")?;
        }

        // --- size/quota ---
        "shadowDocumentSizeLimitBytes" => {
            config.shadow_document_size_limit_bytes =
                value.parse::<u32>().context("expected a positive integer for shadowDocumentSizeLimitBytes")?;
        }
        "maxDiskUtilizationMegaBytes" => {
            config.max_disk_utilization_mega_bytes =
                value.parse::<u64>().context("expected a positive integer for maxDiskUtilizationMegaBytes")?;
        }

        // --- rateLimits ---
        "rateLimits.maxLocalRequestRatePerThing" => {
            config.rate_limits.max_local_request_rate_per_thing = value
                .parse::<u32>()
                .context("expected a positive integer for rateLimits.maxLocalRequestRatePerThing")?;
        }
        "rateLimits.maxTotalLocalRequestRate" => {
            config.rate_limits.max_total_local_request_rate = value
                .parse::<u32>()
                .context("expected a positive integer for rateLimits.maxTotalLocalRequestRate")?;
        }

        // --- logging ---
        "logging.level" => {
            config.logging.level = value.to_string();
        }
        "logging.format" => {
            config.logging.format = value.to_string();
        }

        // --- storage ---
        "storage.dbPath" => {
            config.storage.db_path = value.to_string();
        }

        // --- cloud ---
        "cloud.mqttHost" => {
            config.cloud.mqtt_host = value.to_string();
        }
        "cloud.mqttPort" => {
            config.cloud.mqtt_port = value.parse::<u16>().context("expected a port number for cloud.mqttPort")?;
        }
        "cloud.clientId" => {
            config.cloud.client_id = value.to_string();
        }
        "cloud.httpBaseUrl" => {
            config.cloud.http_base_url = value.to_string();
        }
        "cloud.authToken" => {
            config.cloud.auth_token = value.to_string();
        }

        _ => {
            anyhow::bail!("unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}
