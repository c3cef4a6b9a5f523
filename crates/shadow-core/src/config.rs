//! Configuration module for the shadow manager.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, defaults, and a builder pattern for
//! programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the shadow manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub strategy: StrategyConfig,
    pub synchronize: SynchronizeConfig,
    #[serde(rename = "shadowDocumentSizeLimitBytes")]
    pub shadow_document_size_limit_bytes: u32,
    #[serde(rename = "maxDiskUtilizationMegaBytes")]
    pub max_disk_utilization_mega_bytes: u64,
    #[serde(rename = "rateLimits")]
    pub rate_limits: RateLimitsConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
}

/// Dispatch-timing strategy for the sync worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// `realTime` or `periodic`. Unknown values fall back to `realTime`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Seconds between dispatch cycles when `kind` is `periodic`.
    pub delay: u64,
}

/// One thing's shadow synchronization scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowDocumentScope {
    #[serde(rename = "thingName")]
    pub thing_name: String,
    pub classic: bool,
    #[serde(rename = "namedShadows")]
    pub named_shadows: Vec<String>,
}

/// Which shadows to synchronize and in which direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizeConfig {
    #[serde(rename = "shadowDocuments")]
    pub shadow_documents: Vec<ShadowDocumentScope>,
    /// `betweenDeviceAndCloud`, `deviceToCloud`, or `cloudToDevice`.
    pub direction: String,
    #[serde(rename = "maxOutboundSyncUpdatesPerSecond")]
    pub max_outbound_sync_updates_per_second: u32,
    #[serde(rename = "provideSyncStatus")]
    pub provide_sync_status: bool,
    /// Number of keys the sync worker pool may drain concurrently.
    #[serde(rename = "workerConcurrency", default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

fn default_worker_concurrency() -> usize {
    4
}

/// Inbound local-request rate limiting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(rename = "maxLocalRequestRatePerThing")]
    pub max_local_request_rate_per_thing: u32,
    #[serde(rename = "maxTotalLocalRequestRate")]
    pub max_total_local_request_rate: u32,
}

/// Logging / tracing settings. Ambient, not part of the domain config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

/// Local SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(rename = "dbPath")]
    pub db_path: String,
}

/// Cloud data-plane connection settings (MQTT + HTTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// MQTT broker hostname.
    #[serde(rename = "mqttHost")]
    pub mqtt_host: String,
    /// MQTT broker port.
    #[serde(rename = "mqttPort")]
    pub mqtt_port: u16,
    /// MQTT client identifier; should be unique per gateway.
    #[serde(rename = "clientId")]
    pub client_id: String,
    /// Base URL of the cloud shadow HTTP data-plane API.
    #[serde(rename = "httpBaseUrl")]
    pub http_base_url: String,
    /// Bearer token presented to the HTTP data-plane API.
    #[serde(rename = "authToken")]
    pub auth_token: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/shadow-manager/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("shadow-manager")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Reactive configuration events
// ---------------------------------------------------------------------------

/// One reactive configuration section changing value, posted to the
/// config reconciliation task by the config watcher. The watcher only
/// diffs a reload against the previously applied [`Config`]; it never
/// mutates live collaborators directly, so every runtime effect of a
/// config change funnels through whatever consumes this channel.
///
/// Sections outside this enum (storage, cloud connection, logging,
/// shadow document size/disk quota) are applied once at startup only;
/// changing them requires a process restart.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    /// `strategy.type`/`strategy.delay` changed.
    Strategy(StrategyConfig),
    /// `rateLimits.*` changed.
    RateLimits(RateLimitsConfig),
    /// `synchronize.direction` changed.
    Direction(String),
    /// `synchronize.shadowDocuments` changed.
    ShadowDocuments(Vec<ShadowDocumentScope>),
}

impl Config {
    /// Compares `self` (the configuration currently applied) against
    /// `next` (a freshly reloaded one) and returns one [`ConfigEvent`]
    /// per changed reactive section, in a fixed order.
    #[must_use]
    pub fn diff(&self, next: &Config) -> Vec<ConfigEvent> {
        let mut events = Vec::new();

        if self.strategy != next.strategy {
            events.push(ConfigEvent::Strategy(next.strategy.clone()));
        }
        if self.rate_limits != next.rate_limits {
            events.push(ConfigEvent::RateLimits(next.rate_limits.clone()));
        }
        if self.synchronize.direction != next.synchronize.direction {
            events.push(ConfigEvent::Direction(next.synchronize.direction.clone()));
        }
        if self.synchronize.shadow_documents != next.synchronize.shadow_documents {
            events.push(ConfigEvent::ShadowDocuments(next.synchronize.shadow_documents.clone()));
        }

        events
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: "realTime".to_string(),
            delay: 5,
        }
    }
}

impl Default for SynchronizeConfig {
    fn default() -> Self {
        Self {
            shadow_documents: Vec::new(),
            direction: "betweenDeviceAndCloud".to_string(),
            max_outbound_sync_updates_per_second: 10,
            provide_sync_status: false,
            worker_concurrency: default_worker_concurrency(),
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            max_local_request_rate_per_thing: 10,
            max_total_local_request_rate: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: "/var/lib/shadow-manager/shadows.db".to_string() }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 8883,
            client_id: "shadow-manager".to_string(),
            http_base_url: "https://localhost/shadow".to_string(),
            auth_token: String::new(),
        }
    }
}

// Config derives Default because all its fields implement Default, except
// the two plain numeric fields below which need explicit values.
// (clippy::derivable_impls does not apply here since Config has non-Default
// primitive fields; implemented explicitly.)

impl Config {
    /// Builds a [`Config`] with every section at its documented default.
    fn with_defaults() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            synchronize: SynchronizeConfig::default(),
            shadow_document_size_limit_bytes: 8192,
            max_disk_utilization_mega_bytes: 64,
            rate_limits: RateLimitsConfig::default(),
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            cloud: CloudConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"strategy.delay"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Valid values for `strategy.type`.
const VALID_STRATEGY_TYPES: &[&str] = &["realTime", "periodic"];

/// Valid values for `synchronize.direction`.
const VALID_DIRECTIONS: &[&str] = &["betweenDeviceAndCloud", "deviceToCloud", "cloudToDevice"];

const MIN_SHADOW_DOCUMENT_SIZE_LIMIT_BYTES: u32 = 1;
const MAX_SHADOW_DOCUMENT_SIZE_LIMIT_BYTES: u32 = 30720;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- strategy ---
        if !VALID_STRATEGY_TYPES.contains(&self.strategy.kind.as_str()) {
            errors.push(ValidationError {
                field: "strategy.type".into(),
                message: format!(
                    "invalid strategy type '{}'; valid options: {}",
                    self.strategy.kind,
                    VALID_STRATEGY_TYPES.join(", ")
                ),
            });
        }
        if self.strategy.kind == "periodic" && self.strategy.delay == 0 {
            errors.push(ValidationError {
                field: "strategy.delay".into(),
                message: "must be greater than 0 when strategy.type is 'periodic'".into(),
            });
        }

        // --- synchronize ---
        if !VALID_DIRECTIONS.contains(&self.synchronize.direction.as_str()) {
            errors.push(ValidationError {
                field: "synchronize.direction".into(),
                message: format!(
                    "invalid direction '{}'; valid options: {}",
                    self.synchronize.direction,
                    VALID_DIRECTIONS.join(", ")
                ),
            });
        }
        if self.synchronize.max_outbound_sync_updates_per_second == 0 {
            errors.push(ValidationError {
                field: "synchronize.maxOutboundSyncUpdatesPerSecond".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.synchronize.worker_concurrency == 0 {
            errors.push(ValidationError {
                field: "synchronize.workerConcurrency".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- shadowDocumentSizeLimitBytes ---
        if self.shadow_document_size_limit_bytes < MIN_SHADOW_DOCUMENT_SIZE_LIMIT_BYTES
            || self.shadow_document_size_limit_bytes > MAX_SHADOW_DOCUMENT_SIZE_LIMIT_BYTES
        {
            errors.push(ValidationError {
                field: "shadowDocumentSizeLimitBytes".into(),
                message: format!(
                    "must be in range {MIN_SHADOW_DOCUMENT_SIZE_LIMIT_BYTES}..={MAX_SHADOW_DOCUMENT_SIZE_LIMIT_BYTES}"
                ),
            });
        }

        // --- maxDiskUtilizationMegaBytes ---
        if self.max_disk_utilization_mega_bytes == 0 {
            errors.push(ValidationError {
                field: "maxDiskUtilizationMegaBytes".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- rateLimits ---
        if self.rate_limits.max_local_request_rate_per_thing == 0 {
            errors.push(ValidationError {
                field: "rateLimits.maxLocalRequestRatePerThing".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.rate_limits.max_total_local_request_rate == 0 {
            errors.push(ValidationError {
                field: "rateLimits.maxTotalLocalRequestRate".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.rate_limits.max_total_local_request_rate
            < self.rate_limits.max_local_request_rate_per_thing
        {
            errors.push(ValidationError {
                field: "rateLimits.maxTotalLocalRequestRate".into(),
                message: format!(
                    "maxTotalLocalRequestRate ({}) must not be less than maxLocalRequestRatePerThing ({})",
                    self.rate_limits.max_total_local_request_rate,
                    self.rate_limits.max_local_request_rate_per_thing
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use shadow_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .strategy_type("periodic")
///     .strategy_delay(30)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::with_defaults(),
        }
    }

    // --- strategy ---

    pub fn strategy_type(mut self, kind: impl Into<String>) -> Self {
        self.config.strategy.kind = kind.into();
        self
    }

    pub fn strategy_delay(mut self, seconds: u64) -> Self {
        self.config.strategy.delay = seconds;
        self
    }

    // --- synchronize ---

    pub fn synchronize_shadow_documents(mut self, scopes: Vec<ShadowDocumentScope>) -> Self {
        self.config.synchronize.shadow_documents = scopes;
        self
    }

    pub fn synchronize_direction(mut self, direction: impl Into<String>) -> Self {
        self.config.synchronize.direction = direction.into();
        self
    }

    pub fn synchronize_max_outbound_sync_updates_per_second(mut self, n: u32) -> Self {
        self.config.synchronize.max_outbound_sync_updates_per_second = n;
        self
    }

    pub fn synchronize_provide_sync_status(mut self, provide: bool) -> Self {
        self.config.synchronize.provide_sync_status = provide;
        self
    }

    pub fn synchronize_worker_concurrency(mut self, concurrency: usize) -> Self {
        self.config.synchronize.worker_concurrency = concurrency;
        self
    }

    // --- size/quota ---

    pub fn shadow_document_size_limit_bytes(mut self, bytes: u32) -> Self {
        self.config.shadow_document_size_limit_bytes = bytes;
        self
    }

    pub fn max_disk_utilization_mega_bytes(mut self, mb: u64) -> Self {
        self.config.max_disk_utilization_mega_bytes = mb;
        self
    }

    // --- rateLimits ---

    pub fn rate_limits_max_local_request_rate_per_thing(mut self, n: u32) -> Self {
        self.config.rate_limits.max_local_request_rate_per_thing = n;
        self
    }

    pub fn rate_limits_max_total_local_request_rate(mut self, n: u32) -> Self {
        self.config.rate_limits.max_total_local_request_rate = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.strategy.kind, "realTime");
        assert_eq!(cfg.strategy.delay, 5);
        assert!(cfg.synchronize.shadow_documents.is_empty());
        assert_eq!(cfg.synchronize.direction, "betweenDeviceAndCloud");
        assert_eq!(cfg.synchronize.max_outbound_sync_updates_per_second, 10);
        assert!(!cfg.synchronize.provide_sync_status);
        assert_eq!(cfg.shadow_document_size_limit_bytes, 8192);
        assert_eq!(cfg.max_disk_utilization_mega_bytes, 64);
        assert_eq!(cfg.rate_limits.max_local_request_rate_per_thing, 10);
        assert_eq!(cfg.rate_limits.max_total_local_request_rate, 100);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "json");
    }

    #[test]
    fn default_config_passes_validation() {
        let cfg = ConfigBuilder::new().build();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
strategy:
  type: periodic
  delay: 30
synchronize:
  shadowDocuments:
    - thingName: sensor-1
      classic: true
      namedShadows: ["config"]
  direction: deviceToCloud
  maxOutboundSyncUpdatesPerSecond: 20
  provideSyncStatus: true
shadowDocumentSizeLimitBytes: 4096
maxDiskUtilizationMegaBytes: 128
rateLimits:
  maxLocalRequestRatePerThing: 5
  maxTotalLocalRequestRate: 50
logging:
  level: debug
  format: pretty
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.strategy.kind, "periodic");
        assert_eq!(cfg.strategy.delay, 30);
        assert_eq!(cfg.synchronize.shadow_documents.len(), 1);
        assert_eq!(cfg.synchronize.shadow_documents[0].thing_name, "sensor-1");
        assert_eq!(cfg.synchronize.direction, "deviceToCloud");
        assert_eq!(cfg.synchronize.max_outbound_sync_updates_per_second, 20);
        assert!(cfg.synchronize.provide_sync_status);
        assert_eq!(cfg.shadow_document_size_limit_bytes, 4096);
        assert_eq!(cfg.max_disk_utilization_mega_bytes, 128);
        assert_eq!(cfg.rate_limits.max_local_request_rate_per_thing, 5);
        assert_eq!(cfg.rate_limits.max_total_local_request_rate, 50);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, "pretty");
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.strategy.kind, "");
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_invalid_strategy_type() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.strategy.kind = "whenever".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "strategy.type"));
    }

    #[test]
    fn validate_catches_zero_periodic_delay() {
        let mut cfg = ConfigBuilder::new().strategy_type("periodic").build();
        cfg.strategy.delay = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "strategy.delay"));
    }

    #[test]
    fn validate_allows_zero_delay_for_realtime() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.strategy.delay = 0;
        let errors = cfg.validate();
        assert!(!errors.iter().any(|e| e.field == "strategy.delay"));
    }

    #[test]
    fn validate_catches_invalid_direction() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.synchronize.direction = "sideways".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "synchronize.direction"));
    }

    #[test]
    fn validate_accepts_all_valid_directions() {
        for direction in VALID_DIRECTIONS {
            let cfg = ConfigBuilder::new().synchronize_direction(*direction).build();
            let errors = cfg.validate();
            assert!(
                !errors.iter().any(|e| e.field == "synchronize.direction"),
                "direction '{direction}' should be valid"
            );
        }
    }

    #[test]
    fn validate_catches_shadow_document_size_limit_out_of_range() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.shadow_document_size_limit_bytes = 0;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "shadowDocumentSizeLimitBytes"));

        let mut cfg = ConfigBuilder::new().build();
        cfg.shadow_document_size_limit_bytes = 40_000;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "shadowDocumentSizeLimitBytes"));
    }

    #[test]
    fn validate_accepts_boundary_shadow_document_size_limits() {
        let cfg = ConfigBuilder::new()
            .shadow_document_size_limit_bytes(1)
            .build();
        assert!(!cfg
            .validate()
            .iter()
            .any(|e| e.field == "shadowDocumentSizeLimitBytes"));

        let cfg = ConfigBuilder::new()
            .shadow_document_size_limit_bytes(30720)
            .build();
        assert!(!cfg
            .validate()
            .iter()
            .any(|e| e.field == "shadowDocumentSizeLimitBytes"));
    }

    #[test]
    fn validate_catches_zero_disk_utilization() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.max_disk_utilization_mega_bytes = 0;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "maxDiskUtilizationMegaBytes"));
    }

    #[test]
    fn validate_catches_zero_rate_limits() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.rate_limits.max_local_request_rate_per_thing = 0;
        cfg.rate_limits.max_total_local_request_rate = 0;
        let errors = cfg.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"rateLimits.maxLocalRequestRatePerThing"));
        assert!(fields.contains(&"rateLimits.maxTotalLocalRequestRate"));
    }

    #[test]
    fn validate_catches_total_rate_below_per_thing_rate() {
        let cfg = ConfigBuilder::new()
            .rate_limits_max_local_request_rate_per_thing(50)
            .rate_limits_max_total_local_request_rate(10)
            .build();
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "rateLimits.maxTotalLocalRequestRate"));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.logging.level = "verbose".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn validate_catches_invalid_log_format() {
        let mut cfg = ConfigBuilder::new().build();
        cfg.logging.format = "xml".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.format"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let cfg = ConfigBuilder::new().logging_level(*level).build();
            let errors = cfg.validate();
            assert!(
                !errors.iter().any(|e| e.field == "logging.level"),
                "level '{level}' should be valid"
            );
        }
    }

    // -- Builder --

    #[test]
    fn builder_starts_from_defaults() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.strategy.kind, "realTime");
        assert_eq!(cfg.synchronize.direction, "betweenDeviceAndCloud");
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .strategy_type("periodic")
            .strategy_delay(15)
            .synchronize_direction("cloudToDevice")
            .synchronize_max_outbound_sync_updates_per_second(5)
            .synchronize_provide_sync_status(true)
            .shadow_document_size_limit_bytes(2048)
            .max_disk_utilization_mega_bytes(32)
            .rate_limits_max_local_request_rate_per_thing(3)
            .rate_limits_max_total_local_request_rate(30)
            .logging_level("warn")
            .logging_format("pretty")
            .build();

        assert_eq!(cfg.strategy.kind, "periodic");
        assert_eq!(cfg.strategy.delay, 15);
        assert_eq!(cfg.synchronize.direction, "cloudToDevice");
        assert_eq!(cfg.synchronize.max_outbound_sync_updates_per_second, 5);
        assert!(cfg.synchronize.provide_sync_status);
        assert_eq!(cfg.shadow_document_size_limit_bytes, 2048);
        assert_eq!(cfg.max_disk_utilization_mega_bytes, 32);
        assert_eq!(cfg.rate_limits.max_local_request_rate_per_thing, 3);
        assert_eq!(cfg.rate_limits.max_total_local_request_rate, 30);
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.logging.format, "pretty");
    }

    #[test]
    fn builder_build_validated_succeeds_for_valid_config() {
        let result = ConfigBuilder::new().build_validated();
        assert!(result.is_ok());
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .strategy_type("periodic")
            .logging_level("nope")
            .build();
        let mut cfg = result;
        cfg.strategy.delay = 0;
        let errors = cfg.validate();
        assert!(errors.len() >= 2);
    }

    // -- default_path --

    #[test]
    fn default_path_ends_with_config_yaml() {
        let p = Config::default_path();
        assert!(p.ends_with("shadow-manager/config.yaml"));
    }

    // -- ConfigEvent / diff --

    #[test]
    fn diff_detects_no_changes() {
        let cfg = ConfigBuilder::new().build();
        assert!(cfg.diff(&cfg.clone()).is_empty());
    }

    #[test]
    fn diff_emits_strategy_event_on_change() {
        let before = ConfigBuilder::new().build();
        let after = ConfigBuilder::new().strategy_type("periodic").strategy_delay(30).build();
        let events = before.diff(&after);
        assert_eq!(events, vec![ConfigEvent::Strategy(after.strategy.clone())]);
    }

    #[test]
    fn diff_emits_rate_limits_event_on_change() {
        let before = ConfigBuilder::new().build();
        let after = ConfigBuilder::new().rate_limits_max_local_request_rate_per_thing(99).build();
        let events = before.diff(&after);
        assert_eq!(events, vec![ConfigEvent::RateLimits(after.rate_limits.clone())]);
    }

    #[test]
    fn diff_emits_direction_event_on_change() {
        let before = ConfigBuilder::new().build();
        let after = ConfigBuilder::new().synchronize_direction("deviceToCloud").build();
        let events = before.diff(&after);
        assert_eq!(events, vec![ConfigEvent::Direction("deviceToCloud".to_string())]);
    }

    #[test]
    fn diff_emits_shadow_documents_event_on_change() {
        let before = ConfigBuilder::new().build();
        let scopes = vec![ShadowDocumentScope { thing_name: "sensor-1".into(), classic: true, named_shadows: vec![] }];
        let after = ConfigBuilder::new().synchronize_shadow_documents(scopes.clone()).build();
        let events = before.diff(&after);
        assert_eq!(events, vec![ConfigEvent::ShadowDocuments(scopes)]);
    }

    #[test]
    fn diff_emits_multiple_events_for_multiple_changes() {
        let before = ConfigBuilder::new().build();
        let after = ConfigBuilder::new().strategy_type("periodic").strategy_delay(10).logging_level("debug").build();
        let events = before.diff(&after);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ConfigEvent::Strategy(_)));
    }

    // -- ValidationError Display --

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "strategy.delay".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "strategy.delay: must be greater than 0");
    }
}
