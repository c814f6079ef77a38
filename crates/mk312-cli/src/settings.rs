//! Persisted tool settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mk312_device::DeviceConfig;
use mk312_link::{DiscoveryConfig, LinkConfig, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};

/// Settings loaded from `settings.json`; command-line flags override them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Serial port of the box
    pub port: Option<String>,
    /// Serial baud rate
    pub baud_rate: u32,
    /// `host:port` of a network bridge, used instead of the serial port
    pub address: Option<String>,
    /// Session timing and keying
    pub link: LinkConfig,
    /// Channel ranges, mix, and loop timing
    pub device: DeviceConfig,
    /// Network discovery
    pub discovery: DiscoveryConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            address: None,
            link: LinkConfig::default(),
            device: DeviceConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for mk312
    /// Uses $XDG_CONFIG_HOME/mk312, falls back to ~/.config/mk312
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("mk312"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("mk312"))
    }

    /// Default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        match Self::settings_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load settings from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Save settings to `path`, or the default location when `None`
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::settings_path().context("Could not determine settings path")?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(path)
    }
}
