//! Node configuration.
//!
//! A node is configured by a TOML file with four sections: `node` (identity
//! and mode), `runtime` (idle lifetime and eviction watermark), `persist`
//! (which bundled provider to start) and `network` (listen address and seed
//! peers). Every field has a default so an empty file is a valid single-node
//! configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default idle lifetime for instances whose behaviour does not supply one:
/// ten minutes.
pub const DEFAULT_TIME_TO_LIVE_MS: u64 = 600_000;

/// Default free-memory fraction below which the oldest instance is evicted.
pub const DEFAULT_LOW_MEMORY_WATERMARK: f64 = 0.20;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Complete configuration for one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub runtime: RuntimeSection,
    pub persist: PersistSection,
    pub network: NetworkSection,
}

impl NodeConfig {
    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Identity and mode of this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NodeSection {
    /// Display name; the listen address stands in when empty.
    pub name: String,
    /// A client-only node routes sends but never hosts actors.
    pub client_only: bool,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            client_only: false,
        }
    }
}

/// Runtime tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeSection {
    /// Fallback idle lifetime in milliseconds.
    pub default_time_to_live_ms: u64,
    /// Free-memory fraction below which the stopper evicts.
    pub low_memory_watermark: f64,
}

impl RuntimeSection {
    pub fn default_time_to_live(&self) -> Duration {
        Duration::from_millis(self.default_time_to_live_ms)
    }
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            default_time_to_live_ms: DEFAULT_TIME_TO_LIVE_MS,
            low_memory_watermark: DEFAULT_LOW_MEMORY_WATERMARK,
        }
    }
}

/// Which bundled persistence provider to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistProvider {
    Memory,
    Disk,
}

/// Persistence provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PersistSection {
    pub provider: PersistProvider,
    /// Data directory for the disk provider.
    pub path: PathBuf,
    /// Entry bound for the memory provider; unbounded when absent.
    pub capacity: Option<usize>,
}

impl Default for PersistSection {
    fn default() -> Self {
        Self {
            provider: PersistProvider::Disk,
            path: PathBuf::from("./data/actors"),
            capacity: None,
        }
    }
}

/// Cluster fabric settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NetworkSection {
    /// Listen address; doubles as the node's cluster identity.
    pub listen: SocketAddr,
    /// Seed peers probed for membership.
    pub peers: Vec<SocketAddr>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7370".parse().expect("static default address"),
            peers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = write_config("");
        let config = NodeConfig::load(file.path()).unwrap();

        assert!(!config.node.client_only);
        assert_eq!(config.runtime.default_time_to_live_ms, 600_000);
        assert_eq!(
            config.runtime.default_time_to_live(),
            Duration::from_secs(600)
        );
        assert_eq!(config.persist.provider, PersistProvider::Disk);
        assert!(config.network.peers.is_empty());
    }

    #[test]
    fn sections_parse_from_toml() {
        let file = write_config(
            r#"
[node]
name = "alpha"
client_only = true

[runtime]
default_time_to_live_ms = 1500
low_memory_watermark = 0.1

[persist]
provider = "memory"
capacity = 128

[network]
listen = "127.0.0.1:9000"
peers = ["127.0.0.1:9001", "127.0.0.1:9002"]
"#,
        );
        let config = NodeConfig::load(file.path()).unwrap();

        assert_eq!(config.node.name, "alpha");
        assert!(config.node.client_only);
        assert_eq!(config.runtime.default_time_to_live_ms, 1500);
        assert_eq!(config.persist.provider, PersistProvider::Memory);
        assert_eq!(config.persist.capacity, Some(128));
        assert_eq!(config.network.peers.len(), 2);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_config("[node]\nbogus = true\n");
        let err = NodeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = NodeConfig::load("/nonexistent/vactor.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/vactor.toml"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
