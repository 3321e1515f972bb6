// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Settings file loading and validation.
//!
//! Settings live in a JSON file (default `./constellation.json`) with
//! PascalCase section and field names. A missing file is created with
//! defaults on first start. Validation enforces the documented minima at
//! construction so misconfigurations fail fast rather than at runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Default settings file path.
pub const DEFAULT_SETTINGS_PATH: &str = "./constellation.json";

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Settings {
    pub webserver: WebserverSettings,
    pub socket: SocketSettings,
    pub heartbeat: HeartbeatSettings,
    pub proxy: ProxySettings,
    pub admin: AdminSettings,
    pub logging: LoggingSettings,
}

/// Public HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WebserverSettings {
    pub hostname: String,
    pub port: u16,
}

impl Default for WebserverSettings {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Worker channel listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SocketSettings {
    pub hostnames: Vec<String>,
    pub port: u16,
    pub ssl: bool,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            hostnames: vec!["127.0.0.1".to_string()],
            port: 8001,
            ssl: false,
        }
    }
}

/// Per-worker heartbeat probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HeartbeatSettings {
    pub interval_ms: u64,
    pub max_failures: u32,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_failures: 5,
        }
    }
}

/// Proxied-request timeouts and response retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProxySettings {
    pub timeout_ms: u64,
    pub response_retention_ms: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            response_retention_ms: 30_000,
        }
    }
}

/// Admin endpoint gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdminSettings {
    pub api_key_header: String,
    pub api_keys: Vec<String>,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            api_key_header: "x-api-key".to_string(),
            api_keys: vec!["constellationadmin".to_string()],
        }
    }
}

/// Logging sinks and severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoggingSettings {
    pub sinks: Vec<String>,
    pub minimum_severity: String,
    pub console_colors: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            sinks: vec!["Console".to_string()],
            minimum_severity: "Info".to_string(),
            console_colors: true,
            file_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the given path, creating the file with defaults
    /// when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let defaults = Self::default();
            let body = serde_json::to_string_pretty(&defaults)?;
            std::fs::write(path, body)?;
            info!(path = %path.display(), "settings file created with defaults");
            defaults.validate()?;
            return Ok(defaults);
        }

        let body = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&body)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Enforce documented minima.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket.hostnames.is_empty() {
            return Err(ConfigError::Invalid {
                field: "Socket.Hostnames",
                reason: "must not be empty",
            });
        }
        if self.heartbeat.interval_ms < 1_000 {
            return Err(ConfigError::Invalid {
                field: "Heartbeat.IntervalMs",
                reason: "must be at least 1000",
            });
        }
        if self.heartbeat.max_failures < 1 {
            return Err(ConfigError::Invalid {
                field: "Heartbeat.MaxFailures",
                reason: "must be at least 1",
            });
        }
        if self.proxy.timeout_ms < 1_000 {
            return Err(ConfigError::Invalid {
                field: "Proxy.TimeoutMs",
                reason: "must be at least 1000",
            });
        }
        if self.proxy.response_retention_ms < 1_000 {
            return Err(ConfigError::Invalid {
                field: "Proxy.ResponseRetentionMs",
                reason: "must be at least 1000",
            });
        }
        if self.admin.api_key_header.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "Admin.ApiKeyHeader",
                reason: "must not be empty",
            });
        }
        if self.admin.api_keys.is_empty() {
            return Err(ConfigError::Invalid {
                field: "Admin.ApiKeys",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file could not be read or created.
    #[error("settings file error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON.
    #[error("settings parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value violates its documented minimum.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.heartbeat.interval_ms, 2_000);
        assert_eq!(settings.heartbeat.max_failures, 5);
        assert_eq!(settings.proxy.timeout_ms, 30_000);
        assert_eq!(settings.proxy.response_retention_ms, 30_000);
        assert_eq!(settings.admin.api_key_header, "x-api-key");
    }

    #[test]
    fn test_interval_boundary() {
        let mut settings = Settings::default();
        settings.heartbeat.interval_ms = 999;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                field: "Heartbeat.IntervalMs",
                ..
            })
        ));

        settings.heartbeat.interval_ms = 1_000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_timeout_boundary() {
        let mut settings = Settings::default();
        settings.proxy.timeout_ms = 999;
        assert!(settings.validate().is_err());
        settings.proxy.timeout_ms = 1_000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_max_failures_minimum() {
        let mut settings = Settings::default();
        settings.heartbeat.max_failures = 0;
        assert!(settings.validate().is_err());
        settings.heartbeat.max_failures = 1;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_api_keys_rejected() {
        let mut settings = Settings::default();
        settings.admin.api_keys.clear();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                field: "Admin.ApiKeys",
                ..
            })
        ));
    }

    #[test]
    fn test_wire_names_are_pascal_case() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("\"Webserver\""));
        assert!(json.contains("\"Hostnames\""));
        assert!(json.contains("\"IntervalMs\""));
        assert!(json.contains("\"MaxFailures\""));
        assert!(json.contains("\"TimeoutMs\""));
        assert!(json.contains("\"ResponseRetentionMs\""));
        assert!(json.contains("\"ApiKeyHeader\""));
        assert!(json.contains("\"ApiKeys\""));
        assert!(json.contains("\"MinimumSeverity\""));
    }

    #[test]
    fn test_partial_file_takes_section_defaults() {
        let json = r#"{"Heartbeat":{"IntervalMs":5000}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.heartbeat.interval_ms, 5_000);
        assert_eq!(settings.heartbeat.max_failures, 5);
        assert_eq!(settings.webserver.port, 8_000);
    }

    #[test]
    fn test_missing_file_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constellation.json");
        assert!(!path.exists());

        let settings = Settings::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(settings.webserver.port, 8_000);

        // Second load reads the created file.
        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.socket.port, settings.socket.port);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constellation.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_out_of_range_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constellation.json");
        std::fs::write(&path, r#"{"Heartbeat":{"IntervalMs":500}}"#).unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
