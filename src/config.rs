//! Configuration for laurel

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("laurel")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the database and persisted documents
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Public domain this actor federates under (e.g. "badges.example.org")
    #[serde(default = "default_domain")]
    pub domain: String,

    /// HTTP listen port for the inbox and document API
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Username of the issuing actor bootstrapped at startup
    #[serde(default = "default_actor_name")]
    pub actor_name: String,

    /// Display name of the issuing actor
    #[serde(default = "default_actor_display_name")]
    pub actor_display_name: String,

    /// Scheduler poll interval in seconds (process and notify lanes)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-request timeout for remote profile fetches and deliveries
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,

    /// Verify HTTP signatures on inbound inbox posts
    #[serde(default = "default_true")]
    pub verify_inbox: bool,

    /// Run the background scheduler (disable for inbox-only instances)
    #[serde(default = "default_true")]
    pub enable_scheduler: bool,
}

fn default_http_port() -> u16 {
    8086
}

fn default_domain() -> String {
    "localhost:8086".to_string()
}

fn default_actor_name() -> String {
    "badges".to_string()
}

fn default_actor_display_name() -> String {
    "Badge Issuer".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            domain: default_domain(),
            http_port: default_http_port(),
            actor_name: default_actor_name(),
            actor_display_name: default_actor_display_name(),
            poll_interval_secs: default_poll_interval(),
            delivery_timeout_secs: default_delivery_timeout(),
            verify_inbox: true,
            enable_scheduler: true,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("laurel.db")
    }

    /// Get directory for persisted note and grant documents
    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Base URL this instance serves documents under
    pub fn base_url(&self) -> String {
        if self.domain.starts_with("localhost") || self.domain.starts_with("127.0.0.1") {
            format!("http://{}", self.domain)
        } else {
            format!("https://{}", self.domain)
        }
    }
}
