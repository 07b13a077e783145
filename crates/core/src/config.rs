//! Queue configuration
//!
//! Loaded from TOML:
//! ```toml
//! poll_interval_ms = 10
//! notifications = ["delete", "write", "extend", "attrib", "rename", "revoke"]
//! start_paused = false
//! ```

use crate::notification::{Notification, ParseNotificationError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default pause between drain passes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause between drain passes in milliseconds (default: 10)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Kinds armed by `watch` when no explicit set is given
    /// (default: the `default` preset)
    #[serde(default = "default_notifications")]
    pub notifications: Vec<String>,

    /// Start with delivery paused (default: false)
    #[serde(default)]
    pub start_paused: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            notifications: default_notifications(),
            start_paused: false,
        }
    }
}

impl QueueConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse queue config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read queue config {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid queue config {}", path.display()))
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize queue config")
    }

    /// Check the interval and kind names
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        let set = self.notification_set()?;
        if !set.is_supported() {
            anyhow::bail!("notifications not supported on this platform: {}", set.unsupported());
        }
        Ok(())
    }

    /// Pause between drain passes
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Kinds armed by default
    pub fn notification_set(&self) -> Result<Notification, ParseNotificationError> {
        Notification::parse_list(&self.notifications)
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_notifications() -> Vec<String> {
    vec!["default".to_string()]
}
