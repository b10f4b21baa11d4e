//! Config command - View and manage shdwdrive configuration
//!
//! Provides the `shdwdrive config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use shdwdrive_core::config::Config;

use crate::CliContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "polling.interval_ms")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("network.endpoint", "Storage API base URL"),
    ("network.cdn", "CDN base URL"),
    ("network.shades_per_gib", "Storage price used for cost estimates"),
    ("polling.interval_ms", "Milliseconds between confirmation reads"),
    ("polling.max_failures", "Consecutive failed reads before giving up (0 = no limit)"),
    ("polling.deadline_secs", "Seconds before giving up, or 'none'"),
    ("polling.reset_failures_on_success", "true|false"),
    ("reconcile.serialize_per_entity", "true|false"),
    ("reconcile.event_capacity", "Buffered pending-action changes"),
    ("logging.level", "trace|debug|info|warn|error"),
];

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.is_json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");
            let yaml = serde_yaml::to_string(&ctx.config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_set(&self, ctx: &CliContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.config.clone();
        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{key}': {e}"));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, description) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {name:<36} - {description}"));
                }
            }
            return Ok(());
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{key}': {}",
                    messages.join("; ")
                ));
            }
            return Ok(());
        }

        if let Some(parent) = ctx.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(&ctx.config_path, yaml).context("Failed to write configuration file")?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": ctx.config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {key} = {value}"));
            formatter.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let path = &ctx.config_path;

        // Load explicitly: a parse error must be reported, not defaulted away
        let config = match Config::load(path) {
            Ok(config) => config,
            Err(_) if !path.exists() => {
                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": ["Configuration file not found. Using defaults."],
                    }));
                } else {
                    formatter.info(&format!("Configuration file not found at {}", path.display()));
                    formatter.info("Using default configuration. Run 'shdwdrive config set <key> <value>' to create one.");
                }
                return Ok(());
            }
            Err(e) => {
                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {e}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {e}"));
                    formatter.info(&format!("File: {}", path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.is_json() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .with_context(|| format!("Expected true or false for {key}"))
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "network.endpoint" => config.network.endpoint = value.to_string(),
        "network.cdn" => config.network.cdn = value.to_string(),
        "network.shades_per_gib" => {
            config.network.shades_per_gib = value
                .parse()
                .context("Expected a positive integer for network.shades_per_gib")?;
        }
        "polling.interval_ms" => {
            config.polling.interval_ms = value
                .parse()
                .context("Expected a positive integer for polling.interval_ms")?;
        }
        "polling.max_failures" => {
            config.polling.max_failures = value
                .parse()
                .context("Expected a non-negative integer for polling.max_failures")?;
        }
        "polling.deadline_secs" => {
            config.polling.deadline_secs = match value {
                "none" | "" => None,
                secs => Some(
                    secs.parse()
                        .context("Expected an integer or 'none' for polling.deadline_secs")?,
                ),
            };
        }
        "polling.reset_failures_on_success" => {
            config.polling.reset_failures_on_success = parse_bool(key, value)?;
        }
        "reconcile.serialize_per_entity" => {
            config.reconcile.serialize_per_entity = parse_bool(key, value)?;
        }
        "reconcile.event_capacity" => {
            config.reconcile.event_capacity = value
                .parse()
                .context("Expected a positive integer for reconcile.event_capacity")?;
        }
        "logging.level" => config.logging.level = value.to_lowercase(),
        other => bail!("Unknown configuration key '{other}'"),
    }
    Ok(())
}
