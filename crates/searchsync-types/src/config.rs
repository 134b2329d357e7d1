//! Configuration loading for searchsync.
//!
//! Layered config: defaults -> user config file -> explicit file -> env vars.
//! The user config file lives at ~/.config/searchsync/config.toml.

use std::collections::BTreeMap;
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// One type included in an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeSettings {
    #[serde(rename = "type")]
    pub type_name: String,

    /// `false` lists the type without including it.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Field declarations keyed by search name, in declaration order.
    ///
    /// Each value is `true`, `false`, or a table with optional `property`
    /// and `options`. Declarations are validated when the index
    /// configuration is built.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl IncludeSettings {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            enabled: true,
            batch_size: None,
            fields: Map::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Declare a field sourced from the attribute of the same name.
    pub fn field(mut self, search_name: impl Into<String>) -> Self {
        self.fields.insert(search_name.into(), Value::Bool(true));
        self
    }

    /// Declare a field sourced from a dot-separated property path.
    pub fn field_with_property(
        mut self,
        search_name: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        let mut spec = Map::new();
        spec.insert("property".to_string(), Value::String(property.into()));
        self.fields.insert(search_name.into(), Value::Object(spec));
        self
    }

    /// Remove a field inherited from an ancestor declaration.
    pub fn without_field(mut self, search_name: impl Into<String>) -> Self {
        self.fields.insert(search_name.into(), Value::Bool(false));
        self
    }

    /// Raw declaration, for shapes the helpers don't cover.
    pub fn field_spec(mut self, search_name: impl Into<String>, spec: Value) -> Self {
        self.fields.insert(search_name.into(), spec);
        self
    }
}

/// A named index: included and excluded types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default)]
    pub include: Vec<IncludeSettings>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl IndexSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, include: IncludeSettings) -> Self {
        self.include.push(include);
        self
    }

    pub fn exclude(mut self, type_name: impl Into<String>) -> Self {
        self.exclude.push(type_name.into());
        self
    }
}

/// Search indexing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// When false, lifecycle handlers and the batch processor do nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Byte budget per serialized document; overrides the backend's limit.
    #[serde(default)]
    pub max_document_size: Option<usize>,

    /// Prefix for backend index names (`{variant}-{name}`).
    #[serde(default)]
    pub index_variant: Option<String>,

    /// Nested cascade levels before descending stops.
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,

    /// Run index jobs inline instead of queueing them.
    #[serde(default)]
    pub use_sync_jobs: bool,

    #[serde(default)]
    pub indexes: BTreeMap<String, IndexSettings>,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_max_cascade_depth() -> usize {
    8
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_batch_size: default_batch_size(),
            max_document_size: None,
            index_variant: None,
            max_cascade_depth: default_max_cascade_depth(),
            use_sync_jobs: false,
            indexes: BTreeMap::new(),
        }
    }
}

impl SearchSettings {
    pub fn with_index(mut self, name: impl Into<String>, index: IndexSettings) -> Self {
        self.indexes.insert(name.into(), index);
        self
    }
}

/// Job retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Job kinds eligible for retry.
    #[serde(default = "default_retryable_jobs")]
    pub retryable_jobs: Vec<String>,

    /// Backend status codes treated as transient.
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_unit_secs")]
    pub backoff_unit_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

fn default_retryable_jobs() -> Vec<String> {
    ["index", "reindex", "clear_index", "remove_cascade"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![408, 504]
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_unit_secs() -> u64 {
    24
}

fn default_backoff_multiplier() -> u32 {
    5
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retryable_jobs: default_retryable_jobs(),
            retryable_status_codes: default_retryable_status_codes(),
            max_attempts: default_max_attempts(),
            backoff_unit_secs: default_backoff_unit_secs(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Completion polling for clear-index jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearIndexSettings {
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_delay_ms() -> u64 {
    2000
}

impl Default for ClearIndexSettings {
    fn default() -> Self {
        Self {
            poll_attempts: default_poll_attempts(),
            poll_delay_ms: default_poll_delay_ms(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to the RocksDB job store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub clear_index: ClearIndexSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "searchsync")
        .map(|p| p.data_local_dir().join("jobs"))
        .unwrap_or_else(|| PathBuf::from("./jobs"))
        .to_string_lossy()
        .to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            db_path: default_db_path(),
            search: SearchSettings::default(),
            retry: RetrySettings::default(),
            clear_index: ClearIndexSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/searchsync/config.toml)
    /// 3. Explicit config file (optional, must exist when given)
    /// 4. Environment variables (SEARCHSYNC_*, `__` between nested keys)
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "searchsync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Self::defaults()?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: SEARCHSYNC_LOG_LEVEL, SEARCHSYNC_SEARCH__DEFAULT_BATCH_SIZE, etc.
        builder = builder.add_source(
            Environment::with_prefix("SEARCHSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::finish(builder)
    }

    /// Parse settings from TOML text layered over the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| ConfigError::Settings(e.to_string()))?
            .set_default("db_path", default_db_path())
            .map_err(|e| ConfigError::Settings(e.to_string()))?
            .set_default("search.default_batch_size", default_batch_size() as i64)
            .map_err(|e| ConfigError::Settings(e.to_string()))?
            .set_default("search.max_cascade_depth", default_max_cascade_depth() as i64)
            .map_err(|e| ConfigError::Settings(e.to_string()))
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings: Settings = builder
            .build()
            .map_err(|e| ConfigError::Settings(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Settings(e.to_string()))?;
        settings.validate()?;
        tracing::debug!(
            indexes = settings.search.indexes.len(),
            db_path = %settings.db_path,
            "Settings loaded"
        );
        Ok(settings)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.default_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(0));
        }
        for index in self.search.indexes.values() {
            for include in &index.include {
                if include.batch_size == Some(0) {
                    return Err(ConfigError::InvalidBatchSize(0));
                }
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Settings("retry.max_attempts must be > 0".to_string()));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
