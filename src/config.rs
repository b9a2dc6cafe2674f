use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::{DeviceIdentity, Result};

/// Port the device description server binds when nothing else is configured.
pub const DEFAULT_DESCRIPTION_PORT: u16 = 56790;
pub const SSDP_PORT: u16 = 1900;
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Everything `DialService::init` captures. Fixed until `uninit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub identity: DeviceIdentity,
    /// 0 lets the OS pick; the bound port is what SSDP advertises.
    pub description_port: u16,
    pub ssdp: SsdpSettings,
    pub wake_on_lan: WakeOnLan,
    pub interface: InterfaceSelection,
    /// Where per-application DIAL data is persisted. In memory when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            description_port: DEFAULT_DESCRIPTION_PORT,
            ssdp: SsdpSettings::default(),
            wake_on_lan: WakeOnLan::default(),
            interface: InterfaceSelection::Auto,
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsdpSettings {
    pub port: u16,
    /// Join 239.255.255.250 on the selected interface. Only loopback test
    /// setups turn this off.
    pub join_multicast: bool,
    pub poll_interval_ms: u64,
    pub server_token: String,
}

impl SsdpSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

impl Default for SsdpSettings {
    fn default() -> Self {
        Self {
            port: SSDP_PORT,
            join_multicast: true,
            poll_interval_ms: 100,
            server_token: format!("Linux/6 UPnP/1.1 dial-receiver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeOnLan {
    pub enabled: bool,
    pub timeout_secs: u16,
}

impl Default for WakeOnLan {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
        }
    }
}

/// Which local interface the receiver advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InterfaceSelection {
    /// Scan interfaces at start.
    #[default]
    Auto,
    /// Use a known address, e.g. on a multi-homed box or in tests.
    Fixed { ip: Ipv4Addr, mac: Option<String> },
}

impl ServiceConfig {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path`, or the default location when `path` is `None`. A missing
    /// default file yields the built-in defaults; a missing explicit file is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("is", "8b", "dial-receiver")
            .map(|dirs| dirs.config_dir().join("dial-receiver.toml"))
    }
}
