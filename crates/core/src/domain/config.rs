//! Configuration management for paraeq
//!
//! This module provides:
//! - `EqConfig`: parameter layout plus engine settings, stored as TOML
//! - `PresetManager`: named parameter snapshots in a preset directory

use crate::domain::params::{EqLayout, ParameterSnapshot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Engine-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,

    /// Largest block the host will hand to `process`
    pub max_block_size: usize,

    /// Pending coefficient updates held for the audio thread
    pub update_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_block_size: 512,
            update_queue_capacity: 4,
        }
    }
}

/// Complete paraeq configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EqConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub layout: EqLayout,
}

impl EqConfig {
    /// Load configuration from a TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&contents)?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to a TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(path, self.to_toml_string()?).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check engine settings and every layout range
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if !(engine.sample_rate.is_finite() && engine.sample_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate must be positive, got {}",
                engine.sample_rate
            )));
        }
        if engine.max_block_size == 0 {
            return Err(ConfigError::Invalid("max_block_size must be positive".to_string()));
        }
        if engine.update_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "update_queue_capacity must be positive".to_string(),
            ));
        }

        self.layout
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Preset manager
///
/// A preset is a parameter snapshot stored as `<name>.toml` in the
/// preset directory.
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    /// Create a new preset manager
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    fn preset_path(&self, name: &str) -> PathBuf {
        self.preset_dir.join(format!("{}.toml", name))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<ParameterSnapshot> {
        let path = self.preset_path(name);
        if !fs::try_exists(&path).await? {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let snapshot: ParameterSnapshot = toml::from_str(&contents)?;
        snapshot
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("preset {name}: {e}")))?;
        Ok(snapshot)
    }

    /// Save a preset by name
    #[instrument(skip(self, snapshot))]
    pub async fn save_preset(&self, name: &str, snapshot: &ParameterSnapshot) -> Result<()> {
        fs::create_dir_all(&self.preset_dir).await?;
        fs::write(self.preset_path(name), toml::to_string_pretty(snapshot)?).await?;
        info!(name, "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name);
        if !fs::try_exists(&path).await? {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        fs::try_exists(self.preset_path(name)).await.unwrap_or(false)
    }
}
