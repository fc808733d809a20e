//! Configuration module for crashline.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::record::DeliveryPriority;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for crashline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reporter: ReporterConfig,
    pub settings: SettingsConfig,
    pub anonymize: AnonymizeConfig,
    pub logging: LoggingConfig,
}

/// How the host application is distributed.
///
/// Store builds never trigger test crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Development,
    Store,
}

/// Crash-report lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Root directory holding queued dump files and the analyzer marker.
    pub storage_root: PathBuf,
    /// Milliseconds to wait after the last trigger before processing the queue.
    pub debounce_ms: u64,
    /// Whether processing may run while the application is in the background.
    pub process_in_background: bool,
    /// Priority requested from the outbound channel.
    pub delivery_priority: DeliveryPriority,
    /// Distribution channel of the host application.
    pub distribution: Distribution,
}

/// Keyed settings store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// JSON file backing the keyed store.
    pub path: PathBuf,
    /// Namespace prepended to every key.
    pub prefix: String,
}

/// PII stripping applied to structured logs before delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnonymizeConfig {
    pub strip_paths: bool,
    pub strip_usernames: bool,
    pub strip_filenames: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load() / save()
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

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/crashline/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("crashline")
            .join("config.yaml")
    }
}

/// Base data directory shared by the default crash root and settings file.
fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("crashline")
}

/// Expand a leading tilde (~) to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if let Some(stripped) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    path.to_path_buf()
}

impl ReporterConfig {
    /// Crash-storage root with `~` expanded.
    pub fn resolved_storage_root(&self) -> PathBuf {
        expand_tilde(&self.storage_root)
    }
}

impl SettingsConfig {
    /// Settings file path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            storage_root: data_dir().join("crashes"),
            debounce_ms: 1000,
            process_in_background: false,
            delivery_priority: DeliveryPriority::High,
            distribution: Distribution::Development,
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("settings.json"),
            prefix: "crashline".to_string(),
        }
    }
}

impl Default for AnonymizeConfig {
    fn default() -> Self {
        Self {
            strip_paths: true,
            strip_usernames: true,
            strip_filenames: false,
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
    /// Dotted path to the offending field, e.g. `"reporter.debounce_ms"`.
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

/// Longest accepted debounce window.
const MAX_DEBOUNCE_MS: u64 = 60_000;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- reporter ---
        if self.reporter.debounce_ms > MAX_DEBOUNCE_MS {
            errors.push(ValidationError {
                field: "reporter.debounce_ms".into(),
                message: format!("must not exceed {MAX_DEBOUNCE_MS}"),
            });
        }

        // Tilde paths are expanded at runtime.
        let root_str = self.reporter.storage_root.to_string_lossy();
        if !root_str.starts_with('~') && self.reporter.storage_root.is_relative() {
            errors.push(ValidationError {
                field: "reporter.storage_root".into(),
                message: format!(
                    "must be an absolute path: {}",
                    self.reporter.storage_root.display()
                ),
            });
        }

        // --- settings ---
        if self.settings.prefix.trim().is_empty() {
            errors.push(ValidationError {
                field: "settings.prefix".into(),
                message: "must not be empty".into(),
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
/// use crashline_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .storage_root(PathBuf::from("/var/lib/myapp/crashes"))
///     .debounce_ms(500)
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

    // --- reporter ---

    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.reporter.storage_root = root;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.reporter.debounce_ms = ms;
        self
    }

    pub fn process_in_background(mut self, allowed: bool) -> Self {
        self.config.reporter.process_in_background = allowed;
        self
    }

    pub fn delivery_priority(mut self, priority: DeliveryPriority) -> Self {
        self.config.reporter.delivery_priority = priority;
        self
    }

    pub fn distribution(mut self, distribution: Distribution) -> Self {
        self.config.reporter.distribution = distribution;
        self
    }

    // --- settings ---

    pub fn settings_path(mut self, path: PathBuf) -> Self {
        self.config.settings.path = path;
        self
    }

    pub fn settings_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.settings.prefix = prefix.into();
        self
    }

    // --- anonymize ---

    pub fn anonymize(mut self, anonymize: AnonymizeConfig) -> Self {
        self.config.anonymize = anonymize;
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
