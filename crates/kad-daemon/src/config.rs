//! Configuration file management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Network settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Lookup/dispatch tuning.
    #[serde(default)]
    pub tuning: TuningConfig,
    /// Logging settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address to bind the listening socket on.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// 0 = OS-assigned ephemeral port.
    #[serde(default)]
    pub bind_port: u16,
    /// Bootstrap contact, `host:port`. Empty starts a fresh network.
    #[serde(default)]
    pub bootstrap_addr: String,
    /// Bootstrap contact's id, hex-encoded. Required if `bootstrap_addr`
    /// is set.
    #[serde(default)]
    pub bootstrap_id: String,
}

/// Lookup and dispatch tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Per-round lookup fan-out. Spec default: `K`.
    #[serde(default = "default_alpha")]
    pub alpha: usize,
    /// Outbound call deadline, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Dispatcher inbound poll slice, in milliseconds.
    #[serde(default = "default_poll_tick_ms")]
    pub poll_tick_ms: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_alpha() -> usize {
    kad_table::K
}

fn default_call_timeout_ms() -> u64 {
    1000
}

fn default_poll_tick_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            bind_port: 0,
            bootstrap_addr: String::new(),
            bootstrap_id: String::new(),
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            call_timeout_ms: default_call_timeout_ms(),
            poll_tick_ms: default_poll_tick_ms(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `path`, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Default config file location: `$KAD_DATA_DIR/config.toml`, falling
    /// back to `~/.kad/config.toml`.
    pub fn default_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// The data directory, honoring the `KAD_DATA_DIR` override.
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("KAD_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".kad"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/kad"))
    }
}
