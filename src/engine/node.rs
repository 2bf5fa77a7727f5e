use super::routing::{self, ForwardPlan};
use crate::cache::codec::CacheCodec;
use crate::cache::store::ResultCache;
use crate::config::types::{NodeConfig, OverlayConfig};
use crate::relay::{ForwardingQueue, RelayMessage};
use crate::rpc::client::NodeClient;
use crate::rpc::protocol::NodeStatsResponse;
use crate::rpc::server::RpcServer;
use crate::store::memory::LocalStore;
use crate::store::types::{Query, QueryResult};
use crate::timing::ledger::TimingLedger;

use anyhow::Result;
use dashmap::DashMap;
use futures_util::FutureExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use sysinfo::System;

/// Result TTL at intermediate nodes.
const INTERMEDIATE_TTL_MS: i32 = 5000;
/// Result TTL at the portal.
const PORTAL_TTL_MS: i32 = 10000;
/// Capacity of the portal's data-message relay.
const RELAY_CAPACITY: usize = 256;

/// The per-node engine: one instance per process, everything it needs passed
/// in at construction.
pub struct NodeEngine {
    node_id: String,
    config: OverlayConfig,
    node_config: NodeConfig,
    store: Arc<LocalStore>,
    cache: Arc<ResultCache>,
    ledger: Arc<TimingLedger>,
    peers: Arc<DashMap<String, Arc<NodeClient>>>,
    server: Arc<RpcServer>,
    relay: Mutex<Option<ForwardingQueue>>,
    codec: CacheCodec,
    ttl_ms: i32,
    running: AtomicBool,
}

impl NodeEngine {
    pub fn new(
        node_id: impl Into<String>,
        config: OverlayConfig,
        store: Arc<LocalStore>,
        cache: Arc<ResultCache>,
    ) -> Result<Arc<Self>> {
        let node_id = node_id.into();
        let node_config = config
            .node(&node_id)
            .ok_or_else(|| anyhow::anyhow!("node {} not present in configuration", node_id))?
            .clone();

        let portal = routing::is_portal(&node_id);

        Ok(Arc::new(Self {
            server: Arc::new(RpcServer::new(node_id.clone())),
            node_id,
            config,
            node_config,
            store,
            cache,
            ledger: Arc::new(TimingLedger::new()),
            peers: Arc::new(DashMap::new()),
            relay: Mutex::new(None),
            codec: if portal { CacheCodec::Headered } else { CacheCodec::Lines },
            ttl_ms: if portal { PORTAL_TTL_MS } else { INTERMEDIATE_TTL_MS },
            running: AtomicBool::new(false),
        }))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound server address once started; the configured port may be 0.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Dials peers, registers handlers, and starts the server. Failed dials
    /// are logged but non-fatal: peers may come up later and `is_connected`
    /// re-checks them on every query.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        for conn_id in &self.node_config.connections {
            let Some(peer_config) = self.config.node(conn_id) else {
                tracing::warn!("Skipping unknown connection {}", conn_id);
                continue;
            };
            let target = peer_config.address();
            tracing::info!("Connecting to {} at {}", conn_id, target);

            let client = Arc::new(NodeClient::new(conn_id.clone(), &target));
            if !client.probe().await {
                tracing::warn!("Failed to connect to {}: peer not reachable yet", conn_id);
            }
            self.peers.insert(conn_id.clone(), client);
        }

        // Handlers hold a weak back-reference: the server must not keep the
        // engine alive, and the engine owns the server.
        let weak = Arc::downgrade(&self);
        self.server.set_query_handler(Arc::new(move |query: Query| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(engine) => engine.handle_query(query).await,
                    None => QueryResult::failure(&query.id, "RPC failed: node shut down"),
                }
            }
            .boxed()
        }));

        let weak = Arc::downgrade(&self);
        self.server.set_data_handler(Arc::new(move |source, destination, data| {
            let weak = weak.clone();
            async move {
                if let Some(engine) = weak.upgrade() {
                    engine.handle_data(&source, &destination, &data).await;
                }
            }
            .boxed()
        }));

        let weak = Arc::downgrade(&self);
        self.server.set_stats_handler(Arc::new(move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(engine) => engine.stats(),
                    None => NodeStatsResponse {
                        node_id: String::new(),
                        address: String::new(),
                        peers: Vec::new(),
                        store_entries: 0,
                        cache_entries: 0,
                        cpu_usage: 0.0,
                        mem_used_mb: 0,
                        mem_total_mb: 0,
                    },
                }
            }
            .boxed()
        }));

        if routing::is_portal(&self.node_id) {
            *self.relay.lock().unwrap() =
                Some(ForwardingQueue::start(self.peers.clone(), RELAY_CAPACITY));
        }

        self.server.start(&self.node_config.address()).await?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops the server and the relay, drops peer stubs, and discards any
    /// in-flight timing state. The cache region stays intact on disk.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.server.stop().await;

        let relay = self.relay.lock().unwrap().take();
        if let Some(relay) = relay {
            relay.shutdown().await;
        }

        self.peers.clear();

        if !self.ledger.is_empty() {
            tracing::info!(
                "Node {} dropping timing state for {} unfinished queries",
                self.node_id,
                self.ledger.len()
            );
        }
    }

    /// The per-query state machine.
    pub async fn handle_query(&self, query: Query) -> QueryResult {
        tracing::info!(
            "Node {} received query: {} with parameters: {:?}",
            self.node_id,
            query.verb,
            query.params
        );

        self.ledger.start(&query.id, &self.node_id);

        // The key must be byte-identical across nodes for equal
        // (verb, params) so co-located caches hit symmetrically.
        let cache_key = cache_key(&query);

        if let Some(payload) = self.cache.get(&cache_key) {
            tracing::info!("Cache hit for query {}", cache_key);
            let mut result = self.codec.decode(&query.id, &payload);
            result.message = "From cache".to_string();
            self.ledger.end(&query.id, "Cache_Access");
            self.ledger.end(&query.id, "Total_Processing");
            result.timing_blob = self.ledger.serialize(&query.id);
            self.ledger.clear(&query.id);
            return result;
        }

        let mut result = self.evaluate_local(&query);
        self.ledger.end(&query.id, "Local_Processing");

        // A failed local evaluation (unknown verb, malformed params) is
        // final: peers would fail the same way, and forwarding would bury
        // the error message under a merge summary.
        let plan = if result.success {
            routing::plan(
                &self.node_id,
                &query.verb,
                &query.params,
                &self.node_config.connections,
            )
        } else {
            ForwardPlan::None
        };
        let candidates = self.forward_candidates(&plan);

        if !candidates.is_empty() {
            let mut targets = Vec::new();
            for peer in candidates {
                if peer.is_connected().await {
                    targets.push(peer);
                }
            }

            let calls = targets.iter().map(|peer| {
                let peer = peer.clone();
                let query = query.clone();
                let ledger = self.ledger.clone();
                async move {
                    let peer_result = peer.query(&query).await;
                    ledger.end(&query.id, &format!("Query_To_{}", peer.peer_id()));
                    (peer.peer_id().to_string(), peer_result)
                }
            });
            let responses = futures_util::future::join_all(calls).await;

            let mut downstream = 0usize;
            for (peer_id, peer_result) in responses {
                if !peer_result.success {
                    tracing::warn!(
                        "Peer {} contributed nothing to query {}: {}",
                        peer_id,
                        query.id,
                        peer_result.message
                    );
                    continue;
                }
                downstream += 1;
                if !peer_result.timing_blob.is_empty() {
                    self.ledger.attach_downstream(&query.id, &peer_result.timing_blob);
                }
                result.entries.extend(peer_result.entries);
            }

            result.message = format!(
                "Combined results from Process {} and {} downstream processes",
                self.node_id, downstream
            );
            self.ledger.end(&query.id, "Downstream_Queries");
        }

        // Only successful results are memoized; failures must stay
        // uncached so a corrected query is not shadowed.
        if result.success {
            let payload = self.codec.encode(&result);
            if let Err(e) = self.cache.put(&cache_key, &payload, self.ttl_ms) {
                tracing::error!("Failed to cache result for {}: {}", cache_key, e);
            }
        }
        self.ledger.end(&query.id, "Cache_Storage");

        self.ledger.end(&query.id, "Total_Processing");
        result.timing_blob = self.ledger.serialize(&query.id);

        if routing::is_portal(&self.node_id) {
            tracing::info!(
                "\n===== Timing Report =====\n{}",
                self.ledger.report(&query.id)
            );
        }
        self.ledger.clear(&query.id);

        result
    }

    /// This node's contribution to the query.
    ///
    /// `get_by_borough` short-circuits on the ownership table: a non-owner
    /// contributes an empty success without touching the store.
    fn evaluate_local(&self, query: &Query) -> QueryResult {
        if query.verb == "get_by_borough" {
            return match query.params.first() {
                None => QueryResult::failure(&query.id, "No borough provided"),
                Some(borough) if routing::owns_borough(&self.node_id, borough) => {
                    QueryResult::success(&query.id, self.store.get_by_borough(borough))
                }
                Some(_) => QueryResult::success_with_message(
                    &query.id,
                    Vec::new(),
                    "No matching borough data requested",
                ),
            };
        }

        self.store.evaluate(query)
    }

    fn forward_candidates(&self, plan: &ForwardPlan) -> Vec<Arc<NodeClient>> {
        match plan {
            ForwardPlan::FanOut => self
                .peers
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
            ForwardPlan::Direct(peer_id) => self
                .peers
                .get(peer_id)
                .map(|entry| vec![entry.value().clone()])
                .unwrap_or_default(),
            ForwardPlan::None => Vec::new(),
        }
    }

    /// Inbound data messages: local delivery, relay toward the destination,
    /// or drop.
    pub async fn handle_data(&self, source: &str, destination: &str, data: &[u8]) {
        tracing::info!(
            "Node {} received data from {} to {}",
            self.node_id,
            source,
            destination
        );

        if destination == self.node_id {
            self.process_data(source, data);
            return;
        }

        if self.node_config.connections.is_empty() {
            tracing::error!(
                "Node {} is a leaf and cannot forward data addressed to {}",
                self.node_id,
                destination
            );
            return;
        }

        // The portal hands relaying off to its queue so the RPC task is
        // never blocked on a slow downstream send.
        if routing::is_portal(&self.node_id) {
            let relay = self.relay.lock().unwrap();
            match relay.as_ref() {
                Some(queue) => queue.enqueue(RelayMessage {
                    source: source.to_string(),
                    destination: destination.to_string(),
                    data: data.to_vec(),
                }),
                None => tracing::warn!("Relay not running, dropping message to {}", destination),
            }
            return;
        }

        let peer = self.peers.get(destination).map(|entry| entry.value().clone());
        match peer {
            Some(peer) if peer.is_connected().await => {
                if let Err(e) = peer.send(source, destination, data).await {
                    tracing::warn!("Forward to {} failed: {}", destination, e);
                }
            }
            _ => {
                tracing::warn!(
                    "Cannot forward message to {}: client not connected",
                    destination
                );
            }
        }
    }

    /// Local data delivery. Extension point; the default logs a short hex
    /// preview.
    fn process_data(&self, source: &str, data: &[u8]) {
        let preview: String = data
            .iter()
            .take(16)
            .map(|byte| format!("{:02x} ", byte))
            .collect();
        tracing::info!("Processing data from {}: {}", source, preview.trim_end());
    }

    fn stats(&self) -> NodeStatsResponse {
        let mut sys = System::new_all();
        sys.refresh_cpu();
        sys.refresh_memory();

        NodeStatsResponse {
            node_id: self.node_id.clone(),
            address: self.node_config.address(),
            peers: self.peers.iter().map(|entry| entry.key().clone()).collect(),
            store_entries: self.store.len(),
            cache_entries: self.cache.entry_count(),
            cpu_usage: sys.global_cpu_info().cpu_usage(),
            // sysinfo reports bytes.
            mem_used_mb: sys.used_memory() / (1024 * 1024),
            mem_total_mb: sys.total_memory() / (1024 * 1024),
        }
    }
}

/// The cache key for a query: `query_<verb>` plus `_<param>` for each
/// parameter, in order.
pub fn cache_key(query: &Query) -> String {
    let mut key = format!("query_{}", query.verb);
    for param in &query.params {
        key.push('_');
        key.push_str(param);
    }
    key
}
