// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker configuration for connecting to the controller.

use std::env;
use std::net::SocketAddr;

use constellation_protocol::ChannelClientConfig;

use crate::error::{Result, WorkerError};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Controller channel address
    pub controller_addr: SocketAddr,
    /// Server name for TLS verification (default: "localhost")
    pub server_name: String,
    /// Verify the controller certificate against the system roots. Off by
    /// default: self-signed deployments skip verification.
    pub ssl: bool,
    /// Reconnection check interval in milliseconds (default: 5000, min 1000)
    pub connection_check_interval_ms: u64,
    /// Connection timeout in milliseconds (default: 10000)
    pub connect_timeout_ms: u64,
}

impl WorkerConfig {
    /// Create a configuration targeting the given controller address.
    pub fn new(controller_addr: SocketAddr) -> Self {
        Self {
            controller_addr,
            server_name: "localhost".to_string(),
            ssl: false,
            connection_check_interval_ms: 5_000,
            connect_timeout_ms: 10_000,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CONSTELLATION_CONTROLLER_ADDR`: controller channel address
    ///
    /// Optional (with defaults):
    /// - `CONSTELLATION_SERVER_NAME`: TLS server name (default: "localhost")
    /// - `CONSTELLATION_SSL`: verify certificates, "true"/"1" (default: false)
    /// - `CONSTELLATION_CONNECTION_CHECK_INTERVAL_MS`: reconnect interval (default: 5000)
    /// - `CONSTELLATION_CONNECT_TIMEOUT_MS`: connect timeout (default: 10000)
    pub fn from_env() -> Result<Self> {
        let controller_addr = env::var("CONSTELLATION_CONTROLLER_ADDR")
            .map_err(|_| WorkerError::Config("CONSTELLATION_CONTROLLER_ADDR is required".into()))?
            .parse()
            .map_err(|e| {
                WorkerError::Config(format!("invalid CONSTELLATION_CONTROLLER_ADDR: {e}"))
            })?;

        let server_name =
            env::var("CONSTELLATION_SERVER_NAME").unwrap_or_else(|_| "localhost".to_string());

        let ssl = env::var("CONSTELLATION_SSL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let connection_check_interval_ms = env::var("CONSTELLATION_CONNECTION_CHECK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000);

        let connect_timeout_ms = env::var("CONSTELLATION_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        let config = Self {
            controller_addr,
            server_name,
            ssl,
            connection_check_interval_ms,
            connect_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the TLS server name.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Enable or disable certificate verification.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Set the reconnection check interval.
    pub fn with_connection_check_interval_ms(mut self, interval_ms: u64) -> Self {
        self.connection_check_interval_ms = interval_ms;
        self
    }

    /// Enforce documented minima.
    pub fn validate(&self) -> Result<()> {
        if self.connection_check_interval_ms < 1_000 {
            return Err(WorkerError::Config(
                "ConnectionCheckIntervalMs must be at least 1000".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn channel_config(&self) -> ChannelClientConfig {
        ChannelClientConfig {
            server_addr: self.controller_addr,
            server_name: self.server_name.clone(),
            skip_cert_verification: !self.ssl,
            connect_timeout_ms: self.connect_timeout_ms,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::new("127.0.0.1:8001".parse().unwrap());
        assert_eq!(config.server_name, "localhost");
        assert!(!config.ssl);
        assert_eq!(config.connection_check_interval_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = WorkerConfig::new("10.0.0.1:9000".parse().unwrap())
            .with_server_name("controller.internal")
            .with_ssl(true)
            .with_connection_check_interval_ms(2_000);

        assert_eq!(config.server_name, "controller.internal");
        assert!(config.ssl);
        assert_eq!(config.connection_check_interval_ms, 2_000);
    }

    #[test]
    fn test_interval_boundary() {
        let config = WorkerConfig::new("127.0.0.1:8001".parse().unwrap())
            .with_connection_check_interval_ms(999);
        assert!(config.validate().is_err());

        let config = WorkerConfig::new("127.0.0.1:8001".parse().unwrap())
            .with_connection_check_interval_ms(1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ssl_controls_cert_verification() {
        let config = WorkerConfig::new("127.0.0.1:8001".parse().unwrap());
        assert!(config.channel_config().skip_cert_verification);

        let config = config.with_ssl(true);
        assert!(!config.channel_config().skip_cert_verification);
    }
}
