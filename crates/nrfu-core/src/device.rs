use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::time::Duration;

/// Default eAPI port.
pub const DEFAULT_EAPI_PORT: u16 = 443;

/// Default connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_port() -> u16 {
    DEFAULT_EAPI_PORT
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for a single device.
///
/// Shared read-only by every test targeting the device; the owning client
/// never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier used in results and progress output
    pub name: String,
    /// Hostname or IP address of the device
    pub host: String,
    /// eAPI HTTPS port (default: 443)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username for HTTP Basic authentication
    pub username: String,
    /// Password for HTTP Basic authentication
    pub password: String,
    /// Enable secret. Preserved for completeness; the read-only command
    /// path never sends it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_password: Option<String>,
    /// Free-form tags for inventory filtering
    #[serde(default)]
    pub tags: HashSet<String>,
    /// Connect timeout (default: 30s)
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
    /// Skip TLS certificate verification for this device
    #[serde(default)]
    pub insecure: bool,
    /// Disable the per-device command cache
    #[serde(default)]
    pub disable_cache: bool,
    /// Extra metadata passed through to reporters
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl DeviceConfig {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_EAPI_PORT,
            username: username.into(),
            password: password.into(),
            enable_password: None,
            tags: HashSet::new(),
            timeout: DEFAULT_TIMEOUT,
            insecure: false,
            disable_cache: false,
            extra: HashMap::new(),
        }
    }

    /// eAPI endpoint URL for this device.
    pub fn endpoint(&self) -> String {
        format!("https://{}:{}/command-api", self.host, self.port)
    }
}

// Serialize the timeout as plain seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Connection lifecycle of a device client.
///
/// Only `Established` permits command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial and terminal state
    Closed,
    /// Probe request in flight
    Connecting,
    /// Probe answered, model not yet parsed
    Connected,
    /// Ready for command execution
    Established,
    /// Probe failed
    Error,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Established => write!(f, "established"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_on_deserialize() {
        let config: DeviceConfig = serde_json::from_value(serde_json::json!({
            "name": "leaf1",
            "host": "10.0.0.1",
            "username": "admin",
            "password": "arista",
        }))
        .unwrap();

        assert_eq!(config.port, 443);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.insecure);
        assert!(!config.disable_cache);
        assert_eq!(config.endpoint(), "https://10.0.0.1:443/command-api");
    }
}
