//! Runner configuration.
//!
//! ```yaml
//! listen: 127.0.0.1:7400
//! storage: node0.eeprom
//! slaves: [1, 2]
//! tick_interval_ms: 5
//! metrics_listen: 127.0.0.1:9000
//! router:
//!   serial_byte_timeout_ms: 1000
//!   mesh:
//!     read_timeout_ms: 1000
//! ```
//!
//! Every field is optional. Command-line flags override `node_id`, `listen`,
//! `storage` and `metrics_listen`. `metrics_listen` only takes effect in
//! builds with the `prometheus` feature.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use r2_packet::DEVICE_HOST_LOCAL;
use r2_router::{ConfigError, RouterConfig};
use serde::{Deserialize, Serialize};

/// Settings of one `r2router` process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Address the serial bridge listens on.
    pub listen: String,
    /// Node address to persist before starting. Kept as stored when absent.
    pub node_id: Option<u8>,
    /// Non-volatile storage file. In-memory when absent.
    pub storage: Option<PathBuf>,
    /// In-process simulated slaves joined to the master's mesh.
    pub slaves: Vec<u8>,
    /// Idle loop period of the node thread (milliseconds).
    pub tick_interval_ms: u64,
    /// Address of the Prometheus `/metrics` endpoint. Not served when absent.
    pub metrics_listen: Option<SocketAddr>,
    /// Node timing.
    pub router: RouterConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            listen: "127.0.0.1:7400".to_string(),
            node_id: None,
            storage: None,
            slaves: Vec::new(),
            tick_interval_ms: 5,
            metrics_listen: None,
            router: RouterConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Parse from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: RunnerConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Reject values the runner can't start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.router.validate()?;
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be non-zero".into()));
        }
        if self.slaves.contains(&DEVICE_HOST_LOCAL) {
            return Err(ConfigError::Invalid("slave address 0 is the master".into()));
        }
        let mut seen = self.slaves.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.slaves.len() {
            return Err(ConfigError::Invalid("duplicate slave address".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(RunnerConfig::from_yaml("{}").unwrap(), RunnerConfig::default());
    }

    #[test]
    fn test_nested_router_section() {
        let config = RunnerConfig::from_yaml(
            "slaves: [1, 4]\nrouter:\n  mesh:\n    ping_interval_ms: 3000\n",
        )
        .unwrap();
        assert_eq!(config.slaves, vec![1, 4]);
        assert_eq!(config.router.mesh.ping_interval_ms, Some(3000));
        assert_eq!(config.router.serial_byte_timeout_ms, 1000);
    }

    #[test]
    fn test_bad_slaves_rejected() {
        assert!(RunnerConfig::from_yaml("slaves: [0]").is_err());
        assert!(RunnerConfig::from_yaml("slaves: [2, 2]").is_err());
        assert!(RunnerConfig::from_yaml("tick_interval_ms: 0").is_err());
    }

    #[test]
    fn test_metrics_listen_address() {
        let config = RunnerConfig::from_yaml("metrics_listen: 127.0.0.1:9000").unwrap();
        assert_eq!(config.metrics_listen, Some("127.0.0.1:9000".parse().unwrap()));
        assert!(RunnerConfig::from_yaml("metrics_listen: nowhere").is_err());
    }
}
