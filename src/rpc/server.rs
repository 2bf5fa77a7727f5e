use super::protocol::{
    DataChunk, DataMessage, ENDPOINT_DATA, ENDPOINT_HEALTH, ENDPOINT_QUERY, ENDPOINT_STATS,
    ENDPOINT_STREAM, HealthResponse, NodeStatsResponse, QueryRequest, QueryResponse, WireEntry,
    WireValue,
};
use crate::store::types::{Query, QueryResult};

use anyhow::{Context, Result};
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future::BoxFuture;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Async handler for inbound queries. Holds a back-reference into the engine
/// set after both sides exist; the adapter itself knows nothing about query
/// semantics.
pub type QueryHandler = Arc<dyn Fn(Query) -> BoxFuture<'static, QueryResult> + Send + Sync>;

/// Async handler for inbound data messages `(source, destination, data)`.
pub type DataHandler = Arc<dyn Fn(String, String, Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler producing the stats document.
pub type StatsHandler = Arc<dyn Fn() -> BoxFuture<'static, NodeStatsResponse> + Send + Sync>;

struct ServerShared {
    node_id: String,
    running: Arc<AtomicBool>,
    query_handler: RwLock<Option<QueryHandler>>,
    data_handler: RwLock<Option<DataHandler>>,
    stats_handler: RwLock<Option<StatsHandler>>,
}

/// The inbound side of the transport adapter.
///
/// Each inbound call runs on its own task (one per request), so a query
/// handler blocking on downstream RPCs never starves other inbound calls.
pub struct RpcServer {
    shared: Arc<ServerShared>,
    running: Arc<AtomicBool>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RpcServer {
    pub fn new(node_id: impl Into<String>) -> Self {
        let running = Arc::new(AtomicBool::new(false));
        Self {
            shared: Arc::new(ServerShared {
                node_id: node_id.into(),
                running: running.clone(),
                query_handler: RwLock::new(None),
                data_handler: RwLock::new(None),
                stats_handler: RwLock::new(None),
            }),
            running,
            local_addr: Mutex::new(None),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn set_query_handler(&self, handler: QueryHandler) {
        *self.shared.query_handler.write().unwrap() = Some(handler);
    }

    pub fn set_data_handler(&self, handler: DataHandler) {
        *self.shared.data_handler.write().unwrap() = Some(handler);
    }

    pub fn set_stats_handler(&self, handler: StatsHandler) {
        *self.shared.stats_handler.write().unwrap() = Some(handler);
    }

    /// Binds `address` and starts serving. Returns once the listener is
    /// live; the accept loop runs on a spawned task until [`stop`].
    ///
    /// [`stop`]: RpcServer::stop
    pub async fn start(&self, address: &str) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind server address {}", address))?;
        let local_addr = listener.local_addr()?;

        let app = Router::new()
            .route(ENDPOINT_QUERY, post(handle_query))
            .route(ENDPOINT_STREAM, post(handle_stream))
            .route(ENDPOINT_DATA, post(handle_data))
            .route(ENDPOINT_HEALTH, get(handle_health))
            .route(ENDPOINT_STATS, get(handle_stats))
            .layer(Extension(self.shared.clone()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let running = self.running.clone();
        let node_id = self.shared.node_id.clone();

        let handle = tokio::spawn(async move {
            tracing::info!("Node {} server listening on {}", node_id, local_addr);
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!("Node {} server error: {}", node_id, e);
            }
            running.store(false, Ordering::SeqCst);
        });

        self.running.store(true, Ordering::SeqCst);
        *self.local_addr.lock().unwrap() = Some(local_addr);
        *self.shutdown.lock().unwrap() = Some(shutdown_tx);
        *self.handle.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// Stops accepting and waits for the accept loop to wind down.
    pub async fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(());
        }
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Node {} server stopped", self.shared.node_id);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound address; useful when started on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }
}

async fn handle_query(
    Extension(shared): Extension<Arc<ServerShared>>,
    Json(request): Json<QueryRequest>,
) -> Json<QueryResponse> {
    let handler = shared.query_handler.read().unwrap().clone();
    let Some(handler) = handler else {
        let result = QueryResult::failure(&request.query_id, "Query handler not set");
        return Json(QueryResponse::from_result(&result));
    };

    let result = handler(request.into_query()).await;
    Json(QueryResponse::from_result(&result))
}

async fn handle_data(
    Extension(shared): Extension<Arc<ServerShared>>,
    Json(message): Json<DataMessage>,
) -> StatusCode {
    let handler = shared.data_handler.read().unwrap().clone();
    let Some(handler) = handler else {
        tracing::warn!("Dropping data message {}: data handler not set", message.message_id);
        return StatusCode::SERVICE_UNAVAILABLE;
    };

    handler(message.source, message.destination, message.data).await;
    StatusCode::OK
}

/// Streams the query's entries back as newline-delimited chunks, each chunk
/// carrying one `key:type:value` row.
async fn handle_stream(
    Extension(shared): Extension<Arc<ServerShared>>,
    Json(request): Json<QueryRequest>,
) -> axum::response::Response {
    use axum::body::Body;
    use axum::response::IntoResponse;

    let handler = shared.query_handler.read().unwrap().clone();
    let Some(handler) = handler else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let result = handler(request.into_query()).await;
    let total = result.entries.len();

    let lines = result.entries.iter().enumerate().map(|(i, entry)| {
        let wire = WireEntry::from_entry(entry);
        let rendered = match &wire.value {
            WireValue::Int(v) => format!("{}:int:{}", wire.key, v),
            WireValue::Double(v) => format!("{}:double:{}", wire.key, v),
            WireValue::Bool(v) => format!("{}:bool:{}", wire.key, v),
            WireValue::String(v) => format!("{}:string:{}", wire.key, v),
        };
        let chunk = DataChunk {
            chunk_id: wire.key,
            data: rendered.into_bytes(),
            is_last: i + 1 == total,
        };
        let mut line = serde_json::to_vec(&chunk).unwrap_or_default();
        line.push(b'\n');
        Ok::<_, Infallible>(line)
    });

    let body = Body::from_stream(futures_util::stream::iter(lines.collect::<Vec<_>>()));
    body.into_response()
}

async fn handle_health(Extension(shared): Extension<Arc<ServerShared>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        node_id: shared.node_id.clone(),
        running: shared.running.load(Ordering::SeqCst),
    })
}

async fn handle_stats(
    Extension(shared): Extension<Arc<ServerShared>>,
) -> Result<Json<NodeStatsResponse>, StatusCode> {
    let handler = shared.stats_handler.read().unwrap().clone();
    let Some(handler) = handler else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    Ok(Json(handler().await))
}
