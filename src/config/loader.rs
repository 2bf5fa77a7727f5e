use super::types::OverlayConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Loads and parses the overlay configuration.
///
/// Any failure here (missing file, malformed JSON, wrong shape) is fatal for
/// the caller: a node cannot participate in the overlay without knowing its
/// own endpoint and outbound edges.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<OverlayConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open config file: {}", path.display()))?;

    let config: OverlayConfig = serde_json::from_str(&raw)
        .with_context(|| format!("error parsing config file: {}", path.display()))?;

    for (node_id, node) in &config.processes {
        for conn in &node.connections {
            if !config.processes.contains_key(conn) {
                anyhow::bail!("node {} lists unknown connection {}", node_id, conn);
            }
        }
    }

    tracing::info!(
        "Loaded overlay config: {} nodes, {} overlay edges",
        config.processes.len(),
        config.overlay.len()
    );

    Ok(config)
}
