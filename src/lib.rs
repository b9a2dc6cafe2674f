pub mod apps;
pub mod config;
pub mod error;
pub mod network;
pub mod server;
pub mod service;

pub use error::{DialError, Result};
pub use service::{ControllerState, DialCallbacks, DialEvent, DialService, ServicePorts, ServiceStatus};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FRIENDLY_NAME: &str = "DIAL Receiver";
pub const DEFAULT_MODEL_NAME: &str = "dial-receiver";
pub const DEFAULT_UUID: &str = "deadbeef-dead-beef-dead-beefdeadbeef";

/// Search target a sender puts in its M-SEARCH to find DIAL receivers.
pub const DIAL_SEARCH_TARGET: &str = "urn:dial-multiscreen-org:service:dial:1";

/// Opaque identifier of one launched application instance.
///
/// Issued by the registry on every launch and echoed back unchanged by the
/// sender on status, hide and stop requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<u32>().map(SessionId)
    }
}

/// Application state as reported on the DIAL wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialStatus {
    Running,
    Stopped,
}

impl DialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialStatus::Running => "running",
            DialStatus::Stopped => "stopped",
        }
    }
}

/// Answer of the application layer to a liveness query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub running: bool,
    pub can_stop: bool,
}

impl AppStatus {
    pub fn running() -> Self {
        Self { running: true, can_stop: true }
    }

    pub fn stopped() -> Self {
        Self { running: false, can_stop: true }
    }

    pub fn status(&self) -> DialStatus {
        if self.running {
            DialStatus::Running
        } else {
            DialStatus::Stopped
        }
    }
}

impl Default for AppStatus {
    // Fail open: some senders give up on a receiver that reports stopped
    // right after a launch.
    fn default() -> Self {
        Self::running()
    }
}

/// How the receiver names itself in SSDP replies and in `/dd.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub friendly_name: String,
    pub model_name: String,
    pub uuid: String,
    /// Port of the DIAL application server. `None` or 0 picks an ephemeral port.
    pub http_port: Option<u16>,
}

impl DeviceIdentity {
    pub fn new(friendly_name: impl Into<String>) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            model_name: String::new(),
            uuid: String::new(),
            http_port: None,
        }
    }

    /// Replaces every empty field with its built-in default.
    pub fn with_defaults(mut self) -> Self {
        fill_default(&mut self.friendly_name, DEFAULT_FRIENDLY_NAME);
        fill_default(&mut self.model_name, DEFAULT_MODEL_NAME);
        fill_default(&mut self.uuid, DEFAULT_UUID);
        if self.http_port == Some(0) {
            self.http_port = None;
        }
        self
    }

    /// Applies defaults and rejects values that cannot be put on the wire.
    ///
    /// Line breaks would split SSDP headers, and the UUID ends up inside the
    /// `USN` header where whitespace is not allowed.
    pub fn validated(self) -> Result<Self> {
        let identity = self.with_defaults();

        for (field, value) in [
            ("friendly_name", &identity.friendly_name),
            ("model_name", &identity.model_name),
            ("uuid", &identity.uuid),
        ] {
            if value.chars().any(|c| c.is_control()) {
                return Err(DialError::Config(format!("{} contains control characters", field)));
            }
        }

        if identity.uuid.chars().any(char::is_whitespace) {
            return Err(DialError::Config(format!("uuid '{}' contains whitespace", identity.uuid)));
        }

        Ok(identity)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new("")
    }
}

fn fill_default(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_defaults_fill_empty_fields() {
        let identity = DeviceIdentity::new("Living Room").with_defaults();
        assert_eq!(identity.friendly_name, "Living Room");
        assert_eq!(identity.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(identity.uuid, DEFAULT_UUID);
        assert_eq!(identity.http_port, None);

        let identity = DeviceIdentity::default().with_defaults();
        assert_eq!(identity.friendly_name, DEFAULT_FRIENDLY_NAME);
    }

    #[test]
    fn test_identity_rejects_header_injection() {
        let identity = DeviceIdentity::new("Living\r\nRoom");
        assert!(matches!(identity.validated(), Err(DialError::Config(_))));

        let mut identity = DeviceIdentity::new("Den");
        identity.uuid = "abc def".into();
        assert!(identity.validated().is_err());
    }

    #[test]
    fn test_session_id_round_trips_through_path_segment() {
        let id: SessionId = "42".parse().unwrap();
        assert_eq!(id, SessionId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_app_status_defaults_to_running() {
        let status = AppStatus::default();
        assert_eq!(status.status(), DialStatus::Running);
        assert!(status.can_stop);
        assert_eq!(AppStatus::stopped().status(), DialStatus::Stopped);
    }
}
