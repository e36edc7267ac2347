//! Configuration management for cbus-bridge.
//!
//! Configuration is a JSON document; every field has a default, so an empty
//! object (or no file at all) is a valid configuration. A few settings can be
//! overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cbus::PinIndex;
use crate::error::Result;
use crate::uart::UartConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "CBUS_BRIDGE_CONFIG";

/// Environment variable overriding the monitor poll interval.
pub const POLL_INTERVAL_VAR: &str = "CBUS_POLL_INTERVAL_MS";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// UART line settings
    pub uart: UartConfig,

    /// Input polling
    pub monitor: MonitorConfig,
}

/// Pin monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pin names (CBUSn or CBn) to watch as inputs
    pub pins: Vec<String>,

    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pins: (0..4).map(|i| format!("CBUS{i}")).collect(),
            poll_interval_ms: 100,
        }
    }
}

impl MonitorConfig {
    /// Resolve the configured pin names.
    pub fn pin_indices(&self) -> Result<Vec<PinIndex>> {
        self.pins.iter().map(|name| name.parse::<PinIndex>()).collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load from the file named by `CBUS_BRIDGE_CONFIG`, or defaults if unset,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::load_from(&PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.uart.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(ms) = std::env::var(POLL_INTERVAL_VAR)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.monitor.poll_interval_ms = ms;
        }
    }
}
