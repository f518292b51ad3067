//! Configuration resolution for the kiosk.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/kiosk/settings.json)
//! 3. Project config (.kiosk/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete kiosk configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub sync: BackgroundSyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// On-device agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Directory holding `pending.db` and `outbox.db`.
    pub data_dir: Option<PathBuf>,
    /// Base URL of the remote document store.
    pub remote_url: String,
    /// Collection check-ins are written to.
    pub collection: String,
    pub request_timeout_secs: u64,
    /// Delay between an offline->online edge and the resend pass.
    pub settle_delay_ms: u64,
    /// Delay before the resend pass scheduled at startup.
    pub startup_drain_delay_ms: u64,
    pub probe_interval_secs: u64,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            remote_url: "http://127.0.0.1:8080".to_string(),
            collection: "checkins".to_string(),
            request_timeout_secs: 10,
            settle_delay_ms: 2_000,
            startup_drain_delay_ms: 3_000,
            probe_interval_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub const fn startup_drain_delay(&self) -> Duration {
        Duration::from_millis(self.startup_drain_delay_ms)
    }

    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Resolve the data directory, falling back to the platform default.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(default_data_dir)
    }
}

/// Background sync bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSyncConfig {
    pub enabled: bool,
    /// Name the sync task is registered under.
    pub tag: String,
    /// How long a queued request is kept before it may be discarded.
    pub retention_hours: u64,
    /// Interval of the periodic background wake.
    pub periodic_interval_secs: u64,
}

impl Default for BackgroundSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tag: "checkin-queue".to_string(),
            retention_hours: 24,
            periodic_interval_secs: 15 * 60,
        }
    }
}

impl BackgroundSyncConfig {
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 60 * 60)
    }

    pub const fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }
}

/// Document store server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_path: Option<PathBuf>,
    /// Collection that `POST /api/checkin` writes into.
    pub checkin_collection: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_path: None,
            checkin_collection: "checkins".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".kiosk").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

fn config_root() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".kiosk"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/kiosk"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("kiosk"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_root().map(|p| p.join("settings.json"))
}

/// Default directory for the agent's on-device stores.
pub fn default_data_dir() -> Option<PathBuf> {
    config_root().map(|p| p.join("data"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    // Keep a data dir chosen by a lower layer unless the overlay names one
    let data_dir = overlay.agent.data_dir.clone().or(base.agent.data_dir.take());
    base.agent = overlay.agent;
    base.agent.data_dir = data_dir;

    base.sync = overlay.sync;

    let database_path = overlay
        .server
        .database_path
        .clone()
        .or(base.server.database_path.take());
    base.server = overlay.server;
    base.server.database_path = database_path;
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("KIOSK_REMOTE_URL") {
        config.agent.remote_url = val;
    }
    if let Some(val) = var("KIOSK_DATA_DIR") {
        config.agent.data_dir = Some(PathBuf::from(val));
    }
    if let Some(val) = var("KIOSK_COLLECTION") {
        config.agent.collection.clone_from(&val);
        config.server.checkin_collection = val;
    }
    if let Some(val) = var("KIOSK_LOG_LEVEL") {
        config.agent.log_level.clone_from(&val);
        config.server.log_level = val;
    }
    if let Some(val) = var("KIOSK_SERVER_ADDR") {
        if let Ok(addr) = val.parse() {
            config.server.addr = addr;
        }
    }
    if let Some(val) = var("KIOSK_BACKGROUND_SYNC") {
        config.sync.enabled = !matches!(val.as_str(), "0" | "false" | "off");
    }
}
