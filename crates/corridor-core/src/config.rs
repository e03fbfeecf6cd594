use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Node-level settings for the payment core.
///
/// Component-specific tuning (path finder, cascade timing) lives with the
/// components; this struct carries what the whole node shares. Missing
/// fields in a TOML source fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's overlay identity.
    pub node_id: String,
    /// Directory for the persistent stores.
    pub data_dir: String,
    /// Log filter handed to the embedder's subscriber.
    pub log_level: String,
    /// TTL applied to payments submitted without one, in seconds.
    pub default_ttl_secs: u32,
    /// Hop ceiling for discovery and path selection.
    pub max_hops: u32,
    /// How long discovery waits for route replies, in milliseconds.
    pub discovery_window_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "corridor-node".to_string(),
            data_dir: "./corridor-data".to_string(),
            log_level: "info".to_string(),
            default_ttl_secs: 300,
            max_hops: 10,
            discovery_window_ms: 1500,
        }
    }
}

impl NodeConfig {
    /// Parse from a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, CoreError> {
        toml::from_str(source).map_err(|e| CoreError::Config(e.to_string()))
    }
}
