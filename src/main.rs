use crash_overlay::cache::store::ResultCache;
use crash_overlay::config::loader;
use crash_overlay::engine::node::NodeEngine;
use crash_overlay::store::ingest;
use crash_overlay::store::memory::LocalStore;

use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <node_id> <config_file> [data_file]", args[0]);
        eprintln!("Example: {} B overlay.json data/brooklyn.csv", args[0]);
        std::process::exit(1);
    }

    let node_id = args[1].clone();
    let config_file = &args[2];
    let data_file = args.get(3);

    let config = match loader::load_from_file(config_file) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(LocalStore::new());
    match data_file {
        Some(path) => match ingest::load_csv(&store, path) {
            Ok(count) => tracing::info!("Node {} loaded {} rows", node_id, count),
            // A missing or broken dataset is not fatal; the node serves an
            // empty subset.
            Err(e) => tracing::warn!("Proceeding with empty store: {:#}", e),
        },
        None => {
            tracing::info!("No data file given, seeding demo records");
            ingest::seed_demo_records(&store, &node_id);
        }
    }

    let cache = Arc::new(ResultCache::open(format!(
        "process_{}",
        node_id.to_lowercase()
    )));

    let engine = match NodeEngine::new(node_id.clone(), config, store, cache) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to build node engine: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = engine.clone().start().await {
        tracing::error!("Failed to start node {}: {:#}", node_id, e);
        std::process::exit(1);
    }

    tracing::info!("Node {} started. Press Enter to exit.", node_id);

    let mut line = String::new();
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let _ = stdin.read_line(&mut line).await;

    engine.stop().await;
    tracing::info!("Node {} shut down cleanly", node_id);

    Ok(())
}
