//! Configuration file handling
//!
//! Loads and manages `~/.config/inbox-sync/config.yaml`.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `~/.config/inbox-sync`, or `./.config/inbox-sync` without a home directory
pub fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("inbox-sync");
    path
}

/// Which store backend a client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local SQLite file
    #[default]
    Sqlite,
    /// HTTP store server
    Remote,
}

/// Message store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database (sqlite backend, and the file `serve` exposes)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Server base URL (remote backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bearer token sent to the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_store_path() -> PathBuf {
    config_dir().join("inbox.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            url: None,
            token: None,
        }
    }
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between timer reconciles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Refresh the session and reconcile when the terminal regains focus
    #[serde(default = "default_true")]
    pub refresh_on_focus: bool,
}

fn default_interval_secs() -> u64 {
    22
}

fn default_true() -> bool {
    true
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            refresh_on_focus: true,
        }
    }
}

/// Cross-client relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Shared signal file
    #[serde(default = "default_relay_path")]
    pub path: PathBuf,

    /// How often each client checks the file, in milliseconds
    #[serde(default = "default_relay_poll_millis")]
    pub poll_millis: u64,
}

fn default_relay_path() -> PathBuf {
    config_dir().join("relay.json")
}

fn default_relay_poll_millis() -> u64 {
    500
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            path: default_relay_path(),
            poll_millis: default_relay_poll_millis(),
        }
    }
}

/// Badge and cue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Counts above this render as `N+`
    #[serde(default = "default_badge_cap")]
    pub badge_cap: usize,

    /// Client-scoped sound on/off file
    #[serde(default = "default_sound_preference")]
    pub sound_preference: PathBuf,

    /// Characters shown before a body is truncated
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_badge_cap() -> usize {
    crate::presenter::DEFAULT_BADGE_CAP
}

fn default_sound_preference() -> PathBuf {
    config_dir().join("sound.json")
}

fn default_preview_chars() -> usize {
    crate::presenter::DEFAULT_PREVIEW_CHARS
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            badge_cap: default_badge_cap(),
            sound_preference: default_sound_preference(),
            preview_chars: default_preview_chars(),
        }
    }
}

/// Store server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8086".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Complete `config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Account this client follows
    #[serde(default = "default_account")]
    pub account: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub alert: AlertConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_account() -> String {
    "default".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            account: default_account(),
            store: StoreConfig::default(),
            poll: PollConfig::default(),
            relay: RelayConfig::default(),
            alert: AlertConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Load from the default path (~/.config/inbox-sync/config.yaml)
    ///
    /// Nothing has been written there before `init`, so a missing file yields
    /// the defaults.
    pub fn load_default() -> Result<Self> {
        Self::load_or_new(&Self::default_path())
    }

    /// Load from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::InboxSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            account = %config.account,
            backend = ?config.store.backend,
            interval_secs = config.poll.interval_secs,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn load_or_new(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            Ok(Self::new())
        }
    }

    /// Save to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Default config path (~/.config/inbox-sync/config.yaml)
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay.poll_millis)
    }
}
