//! Node configuration.
//!
//! Timing knobs for every transport and for the mesh session, loaded from
//! YAML. Missing sections and fields fall back to [`Default`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The text is not valid YAML for this structure.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value the node can't run with.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Mesh session timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Longest a master waits for a reply (milliseconds).
    pub read_timeout_ms: u64,
    /// Interval between slave connection checks (milliseconds).
    pub renewal_interval_ms: u64,
    /// Bound on a single address renewal (milliseconds).
    pub renewal_timeout_ms: u64,
    /// Delay before a slave retries a failed reply write (milliseconds).
    pub write_retry_delay_ms: u64,
    /// Interval between slave keep-alive pings; disabled when absent.
    pub ping_interval_ms: Option<u64>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            read_timeout_ms: 1000,
            renewal_interval_ms: 1000,
            renewal_timeout_ms: 500,
            write_retry_delay_ms: 50,
            ping_interval_ms: None,
        }
    }
}

/// Sleep scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Pause applied after a wake, and by `PauseSleep` without arguments.
    pub wake_pause_secs: u8,
    /// Upper bound on any pause.
    pub max_pause_secs: u8,
    /// Settle time before the first sleep after boot (milliseconds).
    pub settle_delay_ms: u64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        SleepConfig {
            wake_pause_secs: 5,
            max_pause_secs: 60,
            settle_delay_ms: 1000,
        }
    }
}

/// I2C bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct I2cConfig {
    /// Bus address the node answers on as a slave.
    pub slave_address: u8,
    /// Longest a master polls for the ready sentinel (milliseconds).
    pub ready_timeout_ms: u64,
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfig {
            slave_address: 0x04,
            ready_timeout_ms: 200,
        }
    }
}

/// Configuration for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Longest gap allowed inside a serial frame (milliseconds).
    pub serial_byte_timeout_ms: u64,
    /// Mesh session timing.
    pub mesh: MeshConfig,
    /// Sleep scheduling.
    pub sleep: SleepConfig,
    /// I2C bus settings.
    pub i2c: I2cConfig,
}

impl RouterConfig {
    /// Parse from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the node can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial_byte_timeout_ms == 0 {
            return Err(ConfigError::Invalid("serial_byte_timeout_ms must be non-zero".into()));
        }
        if self.mesh.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("mesh.read_timeout_ms must be non-zero".into()));
        }
        if self.sleep.wake_pause_secs > self.sleep.max_pause_secs {
            return Err(ConfigError::Invalid(
                "sleep.wake_pause_secs exceeds sleep.max_pause_secs".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            serial_byte_timeout_ms: 1000,
            mesh: MeshConfig::default(),
            sleep: SleepConfig::default(),
            i2c: I2cConfig::default(),
        }
    }
}
