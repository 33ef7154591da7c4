// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulator configuration.

use malcolm::server::ServerConfig;
use malcolm::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Simulator configuration: which device to host and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Device name (default: det)
    #[serde(default = "default_name")]
    pub name: String,

    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_name() -> String {
    "det".to_string()
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            server: ServerConfig::default(),
        }
    }
}

impl SimConfig {
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

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name cannot be empty".into()));
        }
        if self.name.contains('.') {
            return Err(Error::Config(format!(
                "name {} cannot contain '.'",
                self.name
            )));
        }
        self.server.validate()
    }
}
