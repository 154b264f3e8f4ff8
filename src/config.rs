//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

fn default_bus_socket_path() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join("assistant-bus.sock")
}

fn default_idle_display_skill() -> String {
    "homescreen".to_string()
}

fn default_volume_percent() -> f64 {
    0.6
}

fn default_idle_reply_timeout_ms() -> u64 {
    2000
}

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the message bus Unix socket
    #[serde(default = "default_bus_socket_path")]
    pub bus_socket_path: PathBuf,

    /// Skill that renders the default idle screen
    #[serde(default = "default_idle_display_skill")]
    pub idle_display_skill: String,

    /// Skills that may override the idle screen, in priority order
    #[serde(default)]
    pub idle_skill_overrides: Vec<String>,

    /// Volume applied once the device becomes ready
    #[serde(default = "default_volume_percent")]
    pub default_volume_percent: f64,

    /// How long to wait for each skill's answer to an idle offer
    #[serde(default = "default_idle_reply_timeout_ms")]
    pub idle_reply_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("defaults always deserialize")
    }
}

impl Config {
    /// Load configuration from file and defaults
    ///
    /// Reads `$PRESENCE_CONFIG` if set, otherwise
    /// `$XDG_CONFIG_HOME/presence-daemon/config.json` (falling back to
    /// `~/.config`). A missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = match std::env::var("PRESENCE_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::default_path()?,
        };

        if !path.exists() {
            debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        Ok(config)
    }

    fn default_path() -> Result<PathBuf> {
        let base = match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let home = std::env::var("HOME").context("HOME is not set")?;
                PathBuf::from(home).join(".config")
            }
        };
        Ok(base.join("presence-daemon").join("config.json"))
    }

    /// The full idle arbitration chain, with the default display skill
    /// guaranteed to be the last entry
    pub fn idle_skill_chain(&self) -> Vec<String> {
        let mut chain = self.idle_skill_overrides.clone();
        if chain.last() != Some(&self.idle_display_skill) {
            chain.push(self.idle_display_skill.clone());
        }
        chain
    }
}
