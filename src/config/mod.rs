// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for presetvault

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// File and directory locations
    #[serde(default)]
    pub paths: PathConfig,

    /// Undo/redo stack settings
    #[serde(default)]
    pub undo: UndoConfig,

    /// Version snapshot settings
    #[serde(default)]
    pub versions: VersionConfig,

    /// Dependency analysis settings
    #[serde(default)]
    pub dependencies: DependencyConfig,

    /// History backup rotation
    #[serde(default)]
    pub backup: BackupConfig,

    /// Preset directory watcher
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathConfig {
    #[serde(default = "default_preset_dir")]
    pub preset_dir: String,
    #[serde(default = "default_version_dir")]
    pub version_dir: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_undo_file")]
    pub undo_file: String,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UndoConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VersionConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DependencyConfig {
    /// Keys whose values name another preset
    #[serde(default = "default_dependency_keys")]
    pub keys: Vec<String>,
    #[serde(default = "default_retries")]
    pub load_retries: u32,
    /// Glob (relative to the preset directory) for custom parameter definitions
    #[serde(default = "default_parameter_glob")]
    pub parameter_glob: String,
    #[serde(default = "default_config_suffix")]
    pub config_suffix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    #[serde(default = "default_max_days")]
    pub max_days: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub auto_snapshot: bool,
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

// Default value functions
fn default_preset_dir() -> String { "./presets".to_string() }
fn default_version_dir() -> String { "./versions".to_string() }
fn default_history_file() -> String { "preset_change_history.jsonl".to_string() }
fn default_undo_file() -> String { "undo_history.json".to_string() }
fn default_backup_dir() -> String { "history_backups".to_string() }
fn default_max_history() -> usize { 20 }
fn default_retries() -> u32 { 2 }
fn default_parameter_glob() -> String { "custom_parameter_*.json".to_string() }
fn default_config_suffix() -> String { "avatar_config.json".to_string() }
fn default_max_backups() -> usize { 7 }
fn default_max_days() -> u64 { 30 }
fn default_interval() -> u64 { 3600 }
fn default_true() -> bool { true }
fn default_debounce() -> u64 { 500 }

fn default_dependency_keys() -> Vec<String> {
    vec!["base_preset", "inherits", "reference"]
        .into_iter().map(String::from).collect()
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            preset_dir: default_preset_dir(),
            version_dir: default_version_dir(),
            history_file: default_history_file(),
            undo_file: default_undo_file(),
            backup_dir: default_backup_dir(),
        }
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            keys: default_dependency_keys(),
            load_retries: default_retries(),
            parameter_glob: default_parameter_glob(),
            config_suffix: default_config_suffix(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_backups: default_max_backups(),
            max_days: default_max_days(),
            interval_secs: default_interval(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            auto_snapshot: true,
            debounce_ms: default_debounce(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::PresetError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
