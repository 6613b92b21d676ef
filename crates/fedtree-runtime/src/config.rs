//! Federator configuration
//!
//! Loaded once at startup from a TOML file:
//!
//! ```toml
//! redundancy = 2
//! cache_size = 1000
//! bind = "0.0.0.0:7001"
//!
//! [host]
//! id = 1
//! ip = "127.0.0.1"
//! port = 7000
//!
//! [[neighbors]]
//! id = 2
//! ip = "127.0.0.1"
//! port = 7002
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fedtree_core::BrokerId;

use crate::LoggingConfig;

/// Errors that can occur during config loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Address and id of one broker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub id: u64,
    pub ip: String,
    pub port: u16,
}

impl BrokerConfig {
    pub fn broker_id(&self) -> BrokerId {
        BrokerId(self.id)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("broker {} ip {:?}: {}", self.id, self.ip, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_redundancy() -> usize {
    2
}

fn default_cache_size() -> usize {
    1000
}

/// Complete federator configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatorConfig {
    /// Maximum parents per topic
    #[serde(default = "default_redundancy")]
    pub redundancy: usize,
    /// Recency cache capacity per topic
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Local UDP endpoint
    pub bind: String,
    /// Local broker; its id is the federator's id
    pub host: BrokerConfig,
    #[serde(default)]
    pub neighbors: Vec<BrokerConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FederatorConfig {
    /// Read, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: FederatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redundancy == 0 {
            return Err(ConfigError::Invalid("redundancy must be at least 1".into()));
        }
        if self.cache_size == 0 {
            return Err(ConfigError::Invalid("cache_size must be at least 1".into()));
        }

        self.bind_addr()?;
        self.host.socket_addr()?;

        let mut seen = HashSet::new();
        for neighbor in &self.neighbors {
            if neighbor.id == self.host.id {
                return Err(ConfigError::Invalid(format!(
                    "neighbor id {} equals the host id",
                    neighbor.id
                )));
            }
            if !seen.insert(neighbor.id) {
                return Err(ConfigError::Invalid(format!("duplicate neighbor id {}", neighbor.id)));
            }
            neighbor.socket_addr()?;
        }

        Ok(())
    }

    /// This federator's id
    pub fn broker_id(&self) -> BrokerId {
        self.host.broker_id()
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind address {:?}: {}", self.bind, e)))
    }
}
