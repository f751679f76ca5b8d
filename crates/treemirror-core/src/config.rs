//! Configuration module for TreeMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for TreeMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub test_mode: TestModeConfig,
    pub logging: LoggingConfig,
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Account switched to once at startup. Empty keeps the backend's current account.
    pub account: String,
    /// Remote folder the sync root is mirrored into. Empty means the account's root.
    pub root_folder_id: String,
    /// Backend CLI program invoked for every remote operation.
    pub program: String,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory mirrored to the remote store.
    pub target_path: PathBuf,
    /// Minutes to wait between sync cycles.
    pub delay_minutes: u64,
    /// Number of parallel workers per pass.
    pub workers: usize,
    /// Extra attempts for a failed task before the cycle is aborted.
    pub retries: u32,
    /// Base delay (ms) of the exponential backoff between attempts.
    pub retry_base_delay_ms: u64,
    /// JSON file holding the path → remote object map.
    pub state_file: PathBuf,
}

/// Simulated backend used for load testing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestModeConfig {
    /// Bypass the backend CLI entirely.
    pub enabled: bool,
    /// Milliseconds each simulated operation sleeps.
    pub op_delay_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
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
    /// Typically `$XDG_CONFIG_HOME/treemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("treemirror")
            .join("config.yaml")
    }
}

impl SyncConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_minutes * 60)
    }

    /// Base delay of the per-task retry backoff.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl TestModeConfig {
    /// Time each simulated backend operation takes.
    pub fn op_delay(&self) -> Duration {
        Duration::from_millis(self.op_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

// Config and TestModeConfig derive Default.
// (clippy::derivable_impls)

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            root_folder_id: String::new(),
            program: "gdrive".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("treemirror");
        Self {
            target_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Mirror"),
            delay_minutes: 10,
            workers: 8,
            retries: 3,
            retry_base_delay_ms: 1000,
            state_file: data_dir.join("object_map.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.workers"`.
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

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- remote ---
        if !self.test_mode.enabled && self.remote.program.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.program".into(),
                message: "must not be empty unless test_mode is enabled".into(),
            });
        }

        // --- sync ---
        if self.sync.delay_minutes == 0 {
            errors.push(ValidationError {
                field: "sync.delay_minutes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.workers == 0 {
            errors.push(ValidationError {
                field: "sync.workers".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !self.sync.target_path.is_absolute() {
            errors.push(ValidationError {
                field: "sync.target_path".into(),
                message: format!(
                    "must be an absolute path: {}",
                    self.sync.target_path.display()
                ),
            });
        } else if !self.sync.target_path.is_dir() {
            errors.push(ValidationError {
                field: "sync.target_path".into(),
                message: format!(
                    "directory does not exist: {}",
                    self.sync.target_path.display()
                ),
            });
        }
        if self.sync.state_file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "sync.state_file".into(),
                message: "must not be empty".into(),
            });
        } else if self.sync.state_file.starts_with(&self.sync.target_path) {
            errors.push(ValidationError {
                field: "sync.state_file".into(),
                message: "must not live inside sync.target_path".into(),
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
/// use treemirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_target_path(PathBuf::from("/srv/photos"))
///     .sync_workers(16)
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
            config: Config::default(),
        }
    }

    // --- remote ---

    pub fn remote_account(mut self, account: impl Into<String>) -> Self {
        self.config.remote.account = account.into();
        self
    }

    pub fn remote_root_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.remote.root_folder_id = id.into();
        self
    }

    pub fn remote_program(mut self, program: impl Into<String>) -> Self {
        self.config.remote.program = program.into();
        self
    }

    // --- sync ---

    pub fn sync_target_path(mut self, path: PathBuf) -> Self {
        self.config.sync.target_path = path;
        self
    }

    pub fn sync_delay_minutes(mut self, minutes: u64) -> Self {
        self.config.sync.delay_minutes = minutes;
        self
    }

    pub fn sync_workers(mut self, workers: usize) -> Self {
        self.config.sync.workers = workers;
        self
    }

    pub fn sync_retries(mut self, retries: u32) -> Self {
        self.config.sync.retries = retries;
        self
    }

    pub fn sync_retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync.retry_base_delay_ms = ms;
        self
    }

    pub fn sync_state_file(mut self, path: PathBuf) -> Self {
        self.config.sync.state_file = path;
        self
    }

    // --- test_mode ---

    pub fn test_mode(mut self, enabled: bool, op_delay_ms: u64) -> Self {
        self.config.test_mode.enabled = enabled;
        self.config.test_mode.op_delay_ms = op_delay_ms;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
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
