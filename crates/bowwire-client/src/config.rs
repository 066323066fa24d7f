//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/bowwire/config.toml` by default:
//!
//! ```toml
//! debug = false
//!
//! [server]
//! addr = "127.0.0.1:52000"
//! timeout = 5
//!
//! [grammar]
//! required = ["channel"]
//!
//! [grammar.fields]
//! seq = "integer"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bowwire_protocol::GrammarRules;

/// Configuration for the bowwire client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Broker connection settings.
    pub server: ServerSettings,

    /// Grammar applied to records sent and received with `--record(s)`.
    pub grammar: GrammarRules,
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Broker address, `host:port`.
    pub addr: String,

    /// Connection timeout in seconds.
    pub timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: bowwire_server::default_bind_addr().to_string(),
            timeout: 5,
        }
    }
}

impl ServerSettings {
    /// Returns the connection timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does not exist.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bowwire")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bowwire_protocol::FieldType;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert!(!config.debug);
        assert_eq!(config.server.addr, "127.0.0.1:52000");
        assert_eq!(config.server.timeout(), Duration::from_secs(5));
        assert_eq!(config.grammar, GrammarRules::default());
    }

    #[test]
    fn empty_file_is_default() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
debug = true

[server]
addr = "10.0.0.2:6000"

[grammar]
required = ["channel"]
allow_unknown = false

[grammar.fields]
seq = "integer"
"#,
        )
        .unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert!(config.debug);
        assert_eq!(config.server.addr, "10.0.0.2:6000");
        assert_eq!(config.server.timeout, 5);
        assert_eq!(
            config.grammar,
            GrammarRules::default()
                .require("channel")
                .field("seq", FieldType::Integer)
                .deny_unknown()
        );
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.contains("failed to read config"));
    }

    #[test]
    fn load_bad_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\ntimeout = \"soon\"\n").unwrap();

        let err = ClientConfig::load_from(&path).unwrap_err();
        assert!(err.contains("failed to parse config"));
    }

    #[test]
    fn dump_parses_back() {
        let config = ClientConfig {
            debug: true,
            grammar: GrammarRules::default().require("channel"),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("bowwire/config.toml"));
    }
}
