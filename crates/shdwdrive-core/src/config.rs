//! Configuration module for shdwdrive.
//!
//! Typed configuration structs mapping to the YAML configuration file, with
//! loading, validation, defaults, and a builder for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::PollConfig;
use crate::tracker::DEFAULT_EVENT_CAPACITY;

/// Default storage API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://shadow-storage.genesysgo.net";
/// Default CDN serving stored files
pub const DEFAULT_CDN: &str = "https://shdw-drive.genesysgo.net";
/// Default storage price used for cost estimates (0.25 SHDW per GiB)
pub const DEFAULT_SHADES_PER_GIB: u64 = 250_000_000;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for shdwdrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub polling: PollingConfig,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
}

/// Storage network endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the storage API (`list-objects`, `get-object-data`).
    pub endpoint: String,
    /// Base URL of the CDN serving file content.
    pub cdn: String,
    /// Storage price in shades per GiB, used for cost estimates.
    pub shades_per_gib: u64,
}

/// Reconciliation poll loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between probes, in milliseconds.
    pub interval_ms: u64,
    /// Consecutive probe failures tolerated. `0` disables the budget.
    pub max_failures: u32,
    /// Overall time limit in seconds. `None` polls until stopped.
    pub deadline_secs: Option<u64>,
    /// Whether a successful probe resets the failure counter.
    pub reset_failures_on_success: bool,
}

/// Orchestrator behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Serialize mutations on the same entity.
    pub serialize_per_entity: bool,
    /// Capacity of the pending-action change channel.
    pub event_capacity: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
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
    /// Typically `$XDG_CONFIG_HOME/shdwdrive/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("shdwdrive")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cdn: DEFAULT_CDN.to_string(),
            shades_per_gib: DEFAULT_SHADES_PER_GIB,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            interval_ms: poll.interval.as_millis() as u64,
            max_failures: poll.max_failures,
            deadline_secs: poll.deadline.map(|d| d.as_secs()),
            reset_failures_on_success: poll.reset_failures_on_success,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            serialize_per_entity: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
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

impl PollingConfig {
    /// Poll loop settings in runtime form
    #[must_use]
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.interval_ms),
            max_failures: self.max_failures,
            deadline: self.deadline_secs.map(Duration::from_secs),
            reset_failures_on_success: self.reset_failures_on_success,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"polling.interval_ms"`.
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

fn validate_base_url(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("must be an http(s) URL, got '{value}'"),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- network ---
        validate_base_url("network.endpoint", &self.network.endpoint, &mut errors);
        validate_base_url("network.cdn", &self.network.cdn, &mut errors);
        if self.network.shades_per_gib == 0 {
            errors.push(ValidationError {
                field: "network.shades_per_gib".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- polling ---
        if self.polling.interval_ms == 0 {
            errors.push(ValidationError {
                field: "polling.interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if let Some(deadline) = self.polling.deadline_secs {
            if deadline == 0 {
                errors.push(ValidationError {
                    field: "polling.deadline_secs".into(),
                    message: "must be greater than 0 (omit it to poll without a deadline)".into(),
                });
            } else if deadline.saturating_mul(1000) < self.polling.interval_ms {
                errors.push(ValidationError {
                    field: "polling.deadline_secs".into(),
                    message: "must be at least one polling interval".into(),
                });
            }
        }
        if self.polling.max_failures == 0 && self.polling.deadline_secs.is_none() {
            errors.push(ValidationError {
                field: "polling.max_failures".into(),
                message: "an unbounded failure budget requires polling.deadline_secs".into(),
            });
        }

        // --- reconcile ---
        if self.reconcile.event_capacity == 0 {
            errors.push(ValidationError {
                field: "reconcile.event_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- network ---

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.network.endpoint = endpoint.into();
        self
    }

    pub fn cdn(mut self, cdn: impl Into<String>) -> Self {
        self.config.network.cdn = cdn.into();
        self
    }

    pub fn shades_per_gib(mut self, shades: u64) -> Self {
        self.config.network.shades_per_gib = shades;
        self
    }

    // --- polling ---

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.polling.interval_ms = ms;
        self
    }

    pub fn poll_max_failures(mut self, n: u32) -> Self {
        self.config.polling.max_failures = n;
        self
    }

    pub fn poll_deadline_secs(mut self, secs: Option<u64>) -> Self {
        self.config.polling.deadline_secs = secs;
        self
    }

    pub fn poll_reset_failures_on_success(mut self, reset: bool) -> Self {
        self.config.polling.reset_failures_on_success = reset;
        self
    }

    // --- reconcile ---

    pub fn serialize_per_entity(mut self, serialize: bool) -> Self {
        self.config.reconcile.serialize_per_entity = serialize;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.reconcile.event_capacity = capacity;
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
