// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.

use crate::error::{Error, Result};
use crate::server::config::default_max_message_size;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-frame wait for a pending request (milliseconds, 0 = wait forever)
    #[serde(default)]
    pub request_timeout_ms: u64,

    /// Wait for the server's Ready greeting (milliseconds)
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,

    /// Maximum frame size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_ready_timeout() -> u64 {
    5000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 0,
            ready_timeout_ms: default_ready_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl ClientConfig {
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

    /// `None` when requests wait indefinitely.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ready_timeout_ms == 0 {
            return Err(Error::Config("ready_timeout_ms cannot be 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(Error::Config("max_message_size cannot be 0".into()));
        }
        Ok(())
    }
}
