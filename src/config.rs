//! Configuration for flipview
//!
//! Loads configuration from TOML file at `~/.config/flipview/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub flip: FlipConfig,
    pub companion: CompanionConfig,
    pub eligibility: EligibilityConfig,
    pub effects: EffectsConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("flipview");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Flip animation and geometry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipConfig {
    /// Base window animation time in milliseconds (each rotation half lasts twice this)
    pub animation_ms: u64,
    /// Delay after a move/resize ends before the back window is synced for real
    pub grab_debounce_ms: u64,
    /// Keep both windows at least as large as the larger of their minimum sizes
    pub constrain_geometry: bool,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            animation_ms: 250,
            grab_debounce_ms: 500,
            constrain_geometry: true,
        }
    }
}

/// Companion (toolbox provider) applications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Application ids whose presence enables flipping
    pub clubhouse_ids: Vec<String>,
    /// Always managed, regardless of the eligibility lists
    pub privileged_app_ids: Vec<String>,
    /// Extra directories probed for the companion `.desktop` file
    pub application_dirs: Vec<PathBuf>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            clubhouse_ids: vec![
                "com.hack_computer.Clubhouse".to_string(),
                "com.endlessm.Clubhouse".to_string(),
            ],
            privileged_app_ids: vec![
                "com.hack_computer.HackUnlock".to_string(),
                "com.hack_computer.HackToolbox".to_string(),
                "com.endlessm.HackToolbox".to_string(),
            ],
            application_dirs: Vec::new(),
        }
    }
}

/// Where the block/allow lists live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Flatpak installation roots searched for the data file
    pub installations: Vec<PathBuf>,
    pub file_name: String,
    /// Key file group holding `blacklist` and `whitelist`
    pub section: String,
    /// Allow every app when the data file cannot be read
    pub fail_open: bool,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        let mut installations = Vec::new();
        if let Some(data_dir) = dirs::data_dir() {
            installations.push(data_dir.join("flatpak"));
        }
        installations.push(PathBuf::from("/var/lib/flatpak"));

        Self {
            installations,
            file_name: "hack-data.ini".to_string(),
            section: "flip-to-hack".to_string(),
            fail_open: true,
        }
    }
}

/// Back-window effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// `none`, `desaturate` or `fizzics`
    pub default_shader: String,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            default_shader: "desaturate".to_string(),
        }
    }
}
