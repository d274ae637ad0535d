use std::path::Path;

use serde::{Deserialize, Serialize};

use vgpu_common::platform;

use crate::error::CoreError;

/// Top-level configuration, loaded from vgpu.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VgpuConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub guest: GuestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// Native Vulkan loader library to open at startup
    #[serde(default = "default_driver_library")]
    pub driver_library: String,
    /// Maximum live host instances
    #[serde(default = "default_table_capacity")]
    pub max_instances: usize,
    /// Maximum live host devices
    #[serde(default = "default_table_capacity")]
    pub max_devices: usize,
    /// Destroy the objects a connection created when it closes
    #[serde(default)]
    pub release_on_disconnect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestConfig {
    /// Socket the shim connects to (overridden by `VGPU_SOCKET`)
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// What to do with the connection after a transport failure
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Per-read timeout; `None` blocks indefinitely
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
}

/// Guest behavior after a failed round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconnectPolicy {
    /// Keep the failed connection; every later request fails on it too.
    #[serde(rename = "stale")]
    Stale,
    /// Drop the failed connection; the next request connects afresh.
    #[default]
    #[serde(rename = "reconnect")]
    Reconnect,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            driver_library: default_driver_library(),
            max_instances: default_table_capacity(),
            max_devices: default_table_capacity(),
            release_on_disconnect: false,
        }
    }
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            reconnect: ReconnectPolicy::default(),
            read_timeout_ms: None,
        }
    }
}

impl VgpuConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Returns the default config file path.
/// Search order:
/// 1. System-wide config: `/etc/vgpu/vgpu.toml`
/// 2. Local fallback: `./vgpu.toml`
pub fn default_config_path() -> String {
    let system_path = "/etc/vgpu/vgpu.toml";
    if Path::new(system_path).exists() {
        return system_path.to_string();
    }
    "vgpu.toml".to_string()
}

fn default_socket_path() -> String {
    platform::default_socket_path()
}

fn default_driver_library() -> String {
    platform::default_driver_library()
}

fn default_table_capacity() -> usize {
    128
}
