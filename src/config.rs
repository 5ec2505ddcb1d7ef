//! Runtime configuration for the dungeon runtime.
//!
//! Settings are layered file → environment → CLI:
//!
//! ```toml
//! # <root>/dungeons.toml
//! [scripts]
//! queue_capacity = 256
//! workers = 4
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Environment overrides: `DUNGEONS_SCRIPT_WORKERS`, `DUNGEONS_QUEUE_CAPACITY`.
//! `DUNGEONS_LOG` is read by the logging setup as a filter directive.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::layout::Layout;

/// Script engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsSection {
    /// Capacity of the bounded dispatch queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Scripts evaluated concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    4
}

impl Default for ScriptsSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Contents of `dungeons.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DungeonsToml {
    #[serde(default)]
    pub scripts: ScriptsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DungeonsToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse dungeons.toml")
    }

    /// Returns defaults when the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(workers) = lookup("DUNGEONS_SCRIPT_WORKERS").and_then(|v| v.parse().ok()) {
            self.scripts.workers = workers;
        }
        if let Some(capacity) = lookup("DUNGEONS_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.scripts.queue_capacity = capacity;
        }
    }
}

/// Resolved configuration handed to the registry.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub layout: Layout,
    pub queue_capacity: usize,
    pub workers: usize,
    pub logging: LoggingSection,
}

impl RuntimeConfig {
    /// Defaults rooted at `root`, without reading any file.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_toml(Layout::new(root), DungeonsToml::default())
    }

    /// Loads `dungeons.toml` under `root` and applies environment overrides.
    pub fn load(root: impl Into<PathBuf>, verbose: bool) -> Result<Self> {
        let layout = Layout::new(root);
        let mut toml = DungeonsToml::load_or_default(&layout.config_file())?;
        toml.apply_env_from(|key| std::env::var(key).ok());
        if verbose {
            toml.logging.level = "debug".to_string();
        }
        Ok(Self::from_toml(layout, toml))
    }

    pub fn from_toml(layout: Layout, toml: DungeonsToml) -> Self {
        Self {
            layout,
            queue_capacity: toml.scripts.queue_capacity.max(1),
            workers: toml.scripts.workers.max(1),
            logging: toml.logging,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let toml = DungeonsToml::load_or_default(&dir.path().join("dungeons.toml")).unwrap();
        assert_eq!(toml.scripts.queue_capacity, 256);
        assert_eq!(toml.scripts.workers, 4);
        assert_eq!(toml.logging.level, "info");
        assert!(!toml.logging.json);
    }

    #[test]
    fn test_parse_partial_sections() {
        let toml = DungeonsToml::parse(
            r#"
[scripts]
workers = 8
"#,
        )
        .unwrap();
        assert_eq!(toml.scripts.workers, 8);
        assert_eq!(toml.scripts.queue_capacity, 256);
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        let err = DungeonsToml::parse("[scripts\nworkers = ").unwrap_err();
        assert!(err.to_string().contains("dungeons.toml"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = DungeonsToml::parse("[scripts]\nworkers = 2\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("DUNGEONS_SCRIPT_WORKERS", "6"),
            ("DUNGEONS_QUEUE_CAPACITY", "not-a-number"),
        ]
        .into_iter()
        .collect();
        toml.apply_env_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(toml.scripts.workers, 6);
        assert_eq!(toml.scripts.queue_capacity, 256);
    }

    #[test]
    fn test_zero_values_clamp_to_one() {
        let toml = DungeonsToml::parse("[scripts]\nworkers = 0\nqueue_capacity = 0\n").unwrap();
        let config = RuntimeConfig::from_toml(Layout::new("/plugin"), toml);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_load_reads_root_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("dungeons.toml"),
            "[scripts]\nqueue_capacity = 16\n[logging]\njson = true\n",
        )
        .unwrap();
        let config = RuntimeConfig::load(dir.path(), true).unwrap();
        assert_eq!(config.queue_capacity, 16);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "debug");
    }
}
