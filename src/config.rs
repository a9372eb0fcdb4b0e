//! Configuration management for Lectern
//!
//! Handles config file loading/saving and credential lookup.
//! Config is stored at ~/.config/lectern/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_API_URL;
use crate::models::PlaybackRate;
use crate::stream::{BufferLimits, EngineConfig, SavePolicy};

/// Environment variable holding the bearer token
pub const TOKEN_ENV: &str = "LECTERN_TOKEN";
/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "LECTERN_API_URL";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Learning platform API base URL
    pub api_base_url: Option<String>,
    /// Cached bearer token
    pub token: Option<String>,
    /// mpv binary to launch
    pub player: Option<String>,
    /// Playback rate applied to new sessions
    pub default_rate: Option<PlaybackRate>,
    /// Save and playback tunables
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Tunables for progress saving and playback start-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub first_contact_secs: f64,
    pub periodic_save_secs: u64,
    pub completion_ratio: f64,
    pub start_timeout_secs: u64,
    pub max_buffer_bytes: u64,
    pub max_buffer_secs: f64,
    pub max_max_buffer_secs: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let save = SavePolicy::default();
        let engine = EngineConfig::default();
        Self {
            first_contact_secs: save.first_contact_secs,
            periodic_save_secs: save.periodic_interval.as_secs(),
            completion_ratio: save.completion_ratio,
            start_timeout_secs: engine.start_timeout.as_secs(),
            max_buffer_bytes: engine.buffer.max_bytes,
            max_buffer_secs: engine.buffer.max_secs,
            max_max_buffer_secs: engine.buffer.max_max_secs,
        }
    }
}

impl PolicyConfig {
    pub fn save_policy(&self) -> SavePolicy {
        SavePolicy {
            first_contact_secs: self.first_contact_secs.max(0.0),
            periodic_interval: Duration::from_secs(self.periodic_save_secs),
            completion_ratio: self.completion_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            buffer: BufferLimits {
                max_bytes: self.max_buffer_bytes,
                max_secs: self.max_buffer_secs,
                max_max_secs: self.max_max_buffer_secs,
            },
            start_timeout: Duration::from_secs(self.start_timeout_secs.max(1)),
        }
    }
}

impl Config {
    /// Get config file path (~/.config/lectern/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lectern").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from an explicit file, or return default if unreadable
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    /// Save config to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Get the bearer token with fallback chain:
    /// 1. Environment variable LECTERN_TOKEN
    /// 2. Cached token from config file
    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.token.clone().filter(|t| !t.trim().is_empty()))
    }

    /// API base URL: LECTERN_API_URL, then config, then the local default
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn player(&self) -> String {
        self.player
            .clone()
            .unwrap_or_else(|| "mpv".to_string())
    }

    pub fn rate(&self) -> PlaybackRate {
        self.default_rate.unwrap_or_default()
    }
}
