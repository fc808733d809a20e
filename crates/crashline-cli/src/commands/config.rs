//! Config command - View and manage crashline configuration
//!
//! Provides the `crashline config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use crashline_core::config::{Config, Distribution};
use crashline_core::domain::{DeliveryPriority, DomainError};

use crate::output::OutputFormat;

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "reporter.debounce_ms")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, path: &Path, config: &Config, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => show(path, config, format),
            ConfigCommand::Set { key, value } => set(path, config, key, value, format),
            ConfigCommand::Validate => validate(path, format),
        }
    }
}

fn show(path: &Path, config: &Config, format: OutputFormat) -> Result<()> {
    let formatter = format.formatter();
    info!(config_path = %path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    formatter.success(&format!("Configuration ({})", path.display()));
    formatter.info("");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn set(path: &Path, config: &Config, key: &str, value: &str, format: OutputFormat) -> Result<()> {
    let formatter = format.formatter();
    let mut updated = config.clone();

    info!(key = %key, value = %value, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut updated, key, value) {
        formatter.error(&format!("Failed to set '{key}': {e:#}"));
        formatter.info("");
        formatter.info("Supported keys:");
        formatter.info("  reporter.storage_root           - Crash-storage root directory");
        formatter.info("  reporter.debounce_ms            - Processing debounce window");
        formatter.info("  reporter.process_in_background  - true|false");
        formatter.info("  reporter.delivery_priority      - normal|high|critical");
        formatter.info("  reporter.distribution           - development|store");
        formatter.info("  settings.path                   - Settings file path");
        formatter.info("  settings.prefix                 - Settings key prefix");
        formatter.info("  logging.level                   - trace|debug|info|warn|error");
        return Ok(());
    }

    let errors = updated.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.error(&format!("Invalid value for '{key}': {}", messages.join("; ")));
        return Ok(());
    }

    updated
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": value,
            "config_path": path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key} = {value}"));
        formatter.info(&format!("Saved to {}", path.display()));
    }
    Ok(())
}

fn validate(path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = format.formatter();

    if !path.exists() {
        formatter.info(&format!("Configuration file not found at {}", path.display()));
        formatter.info("Using default configuration.");
        return Ok(());
    }

    // Load explicitly so parse errors surface instead of falling back.
    let config = Config::load(path)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;

    info!(config_path = %path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
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

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DomainError::ValidationFailed(format!("{} configuration error(s)", errors.len())).into())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => anyhow::bail!("Expected true or false, got '{other}'"),
    }
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- reporter ---
        "reporter.storage_root" => {
            config.reporter.storage_root = PathBuf::from(value);
        }
        "reporter.debounce_ms" => {
            config.reporter.debounce_ms = value
                .parse::<u64>()
                .context("Expected a positive integer for reporter.debounce_ms")?;
        }
        "reporter.process_in_background" => {
            config.reporter.process_in_background = parse_bool(value)?;
        }
        "reporter.delivery_priority" => {
            config.reporter.delivery_priority = value
                .parse::<DeliveryPriority>()
                .map_err(anyhow::Error::msg)?;
        }
        "reporter.distribution" => {
            config.reporter.distribution = match value {
                "development" => Distribution::Development,
                "store" => Distribution::Store,
                other => anyhow::bail!("Unknown distribution '{other}'"),
            };
        }

        // --- settings ---
        "settings.path" => {
            config.settings.path = PathBuf::from(value);
        }
        "settings.prefix" => {
            config.settings.prefix = value.to_string();
        }

        // --- logging ---
        "logging.level" => {
            config.logging.level = value.to_string();
        }

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}
