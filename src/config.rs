//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - duckrpc.toml (default configuration)
//! - duckrpc.local.toml (git-ignored local overrides)
//! - Environment variables (DUCKRPC_* prefix)
//!
//! Every field has a default, so running without any file is fine.
//!
//! ## Example
//!
//! ```toml
//! # duckrpc.toml
//! [protocol]
//! report_affected_rows = true
//! max_fetch_rows = 10000
//!
//! [appender]
//! default_schema = "main"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! file = "/var/log/duckrpc.log"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! DUCKRPC_PROTOCOL__MAX_FETCH_ROWS=500
//! DUCKRPC_LOGGING__LEVEL=trace
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DUCKRPC_";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub appender: AppenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Wire protocol behaviour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Include `aff` (rows changed) in execute responses
    #[serde(default)]
    pub report_affected_rows: bool,

    /// Upper bound on rows returned by one fetch (0 = unlimited)
    #[serde(default)]
    pub max_fetch_rows: usize,
}

/// Appender settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppenderConfig {
    /// Schema used when an open-appender request names none
    #[serde(default = "default_schema")]
    pub default_schema: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit logs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log file; stderr when unset. Stdout is reserved for responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_schema() -> String {
    "main".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("duckrpc.toml"))
            .merge(Toml::file("duckrpc.local.toml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}

impl Default for AppenderConfig {
    fn default() -> Self {
        AppenderConfig {
            default_schema: default_schema(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            enabled: true,
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.protocol.report_affected_rows);
        assert_eq!(config.protocol.max_fetch_rows, 0);
        assert_eq!(config.appender.default_schema, "main");
    }

    #[test]
    fn test_default_logging_config() {
        let config = Config::default();
        assert!(config.logging.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[protocol]"));
        assert!(toml_str.contains("[appender]"));
        assert!(toml_str.contains("[logging]"));
        assert!(!toml_str.contains("file"));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = Config::default();
        config.protocol.max_fetch_rows = 250;
        config.logging.file = Some(PathBuf::from("/tmp/duckrpc.log"));
        let toml_str = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [protocol]
            report_affected_rows = true

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert!(config.protocol.report_affected_rows);
        assert_eq!(config.protocol.max_fetch_rows, 0);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }
}
