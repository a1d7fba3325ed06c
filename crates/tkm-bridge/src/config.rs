//! Socket path configuration.
//!
//! Two string-valued settings, each with a documented default matching the
//! key manager's well-known rendezvous paths. Absent fields fall back to
//! the defaults; present fields override them.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default path of the key manager's control socket.
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/tkm.rpc.ike";

/// Default path of the event socket served back to the key manager.
pub const DEFAULT_EVENT_SOCKET: &str = "/tmp/tkm.rpc.ees";

/// Configuration for the bridge's two channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Path of the key manager's control socket (we connect).
    #[serde(default = "default_control_socket")]
    pub control_socket: PathBuf,

    /// Path of the event socket (we bind, the key manager connects).
    #[serde(default = "default_event_socket")]
    pub event_socket: PathBuf,
}

fn default_control_socket() -> PathBuf {
    PathBuf::from(DEFAULT_CONTROL_SOCKET)
}

fn default_event_socket() -> PathBuf {
    PathBuf::from(DEFAULT_EVENT_SOCKET)
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            control_socket: default_control_socket(),
            event_socket: default_event_socket(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown keys.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Override the control socket path.
    #[must_use]
    pub fn with_control_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_socket = path.into();
        self
    }

    /// Override the event socket path.
    #[must_use]
    pub fn with_event_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_socket = path.into();
        self
    }
}

/// Errors loading or parsing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),

    /// The configuration content is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_well_known_paths() {
        let config = BridgeConfig::default();
        assert_eq!(config.control_socket, Path::new(DEFAULT_CONTROL_SOCKET));
        assert_eq!(config.event_socket, Path::new(DEFAULT_EVENT_SOCKET));
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = BridgeConfig::from_toml("").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn present_fields_override_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
            control_socket = "/run/tkm/control.sock"
            "#,
        )
        .unwrap();
        assert_eq!(config.control_socket, Path::new("/run/tkm/control.sock"));
        assert_eq!(config.event_socket, Path::new(DEFAULT_EVENT_SOCKET));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = BridgeConfig::from_toml("ike_socket = \"/tmp/x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn builder_overrides() {
        let config = BridgeConfig::default()
            .with_control_socket("/x/ike")
            .with_event_socket("/x/ees");
        assert_eq!(config.control_socket, Path::new("/x/ike"));
        assert_eq!(config.event_socket, Path::new("/x/ees"));
    }
}
