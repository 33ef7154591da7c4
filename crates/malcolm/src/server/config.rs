// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server configuration.

use crate::error::{Error, Result};
use crate::transport::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Endpoint to bind (default: tcp://0.0.0.0:5600)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum frame size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Time granted to in-flight calls on shutdown (milliseconds)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_endpoint() -> String {
    "tcp://0.0.0.0:5600".to_string()
}

pub(crate) fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_shutdown_grace() -> u64 {
    2000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_message_size: default_max_message_size(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Parsed endpoint address.
    pub fn parsed_endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.endpoint)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.parsed_endpoint()?;
        if self.max_message_size == 0 {
            return Err(Error::Config("max_message_size cannot be 0".into()));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(Error::Config(
                "max_message_size cannot exceed the 4-byte frame length".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.endpoint, "tcp://0.0.0.0:5600");
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert_eq!(config.shutdown_grace(), Duration::from_millis(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"endpoint":"tcp://127.0.0.1:6000"}"#).unwrap();
        assert_eq!(config.endpoint, "tcp://127.0.0.1:6000");
        assert_eq!(config.shutdown_grace_ms, 2000);
    }

    #[test]
    fn test_validation() {
        let config = ServerConfig {
            endpoint: "ipc:///tmp/malcolm".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ServerConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        let config = ServerConfig {
            endpoint: "tcp://127.0.0.1:5601".into(),
            shutdown_grace_ms: 500,
            ..Default::default()
        };
        config.to_file(&path).unwrap();
        assert_eq!(ServerConfig::from_file(&path).unwrap(), config);

        assert!(matches!(
            ServerConfig::from_file(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
