use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-node entry of the overlay configuration.
///
/// `connections` lists the node ids this node may forward queries to; these
/// are the authoritative forwarding edges. `data_subset` names the slice of
/// the dataset this node is responsible for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub data_subset: String,
}

impl NodeConfig {
    /// The `host:port` address this node's server binds and peers dial.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The full overlay configuration file.
///
/// The `overlay` list ("AB", "BC", ...) is informational only; the edges that
/// drive forwarding are each node's `connections`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub processes: HashMap<String, NodeConfig>,
    #[serde(default)]
    pub overlay: Vec<String>,
}

impl OverlayConfig {
    /// Looks up a node entry by id.
    pub fn node(&self, node_id: &str) -> Option<&NodeConfig> {
        self.processes.get(node_id)
    }
}
