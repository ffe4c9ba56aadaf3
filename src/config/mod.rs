//! Configuration management for ClawGate
//!
//! Configuration is loaded from `~/.clawgate/config.json` with environment
//! variable overrides of the form `CLAWGATE_SECTION_SUBSECTION_KEY`.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::Result;

use validate::DiagnosticLevel;

impl Config {
    /// Returns the ClawGate configuration directory path (~/.clawgate)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clawgate")
    }

    /// Returns the path to the config file (~/.clawgate/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse the file at `path` without applying any overrides.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Discord
        if let Some(val) = lookup("CLAWGATE_CHANNELS_DISCORD_TOKEN") {
            let channel = self
                .channels
                .discord
                .get_or_insert_with(DiscordConfig::default);
            channel.token = val;
        }
        if let Some(enabled) = lookup("CLAWGATE_CHANNELS_DISCORD_ENABLED").and_then(parse_bool) {
            let channel = self
                .channels
                .discord
                .get_or_insert_with(DiscordConfig::default);
            channel.enabled = enabled;
        }
        if let Some(val) = lookup("CLAWGATE_CHANNELS_DISCORD_ALLOW_FROM") {
            let channel = self
                .channels
                .discord
                .get_or_insert_with(DiscordConfig::default);
            channel.allow_from = split_list(&val);
        }

        // Telegram
        if let Some(val) = lookup("CLAWGATE_CHANNELS_TELEGRAM_TOKEN") {
            let channel = self
                .channels
                .telegram
                .get_or_insert_with(TelegramConfig::default);
            channel.token = val;
        }
        if let Some(enabled) = lookup("CLAWGATE_CHANNELS_TELEGRAM_ENABLED").and_then(parse_bool) {
            let channel = self
                .channels
                .telegram
                .get_or_insert_with(TelegramConfig::default);
            channel.enabled = enabled;
        }
        if let Some(val) = lookup("CLAWGATE_CHANNELS_TELEGRAM_ALLOW_FROM") {
            let channel = self
                .channels
                .telegram
                .get_or_insert_with(TelegramConfig::default);
            channel.allow_from = split_list(&val);
        }

        // Bus
        if let Some(size) = lookup("CLAWGATE_BUS_BUFFER_SIZE").and_then(|v| v.trim().parse().ok())
        {
            self.bus.buffer_size = size;
        }

        // Logging
        if let Some(level) = lookup("CLAWGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CLAWGATE_LOG_FORMAT").and_then(|v| v.parse().ok()) {
            self.logging.format = format;
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Human-readable problems that would prevent the gateway from running.
    ///
    /// Warnings (such as an open allowlist) are not included; see
    /// [`validate::validate_semantics`] for the full diagnostic list.
    pub fn validate(&self) -> Vec<String> {
        validate::validate_semantics(self)
            .into_iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .map(|d| format!("{}: {}", d.path, d.message))
            .collect()
    }
}

fn parse_bool(val: String) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
