use super::protocol::{
    DataChunk, DataMessage, ENDPOINT_DATA, ENDPOINT_HEALTH, ENDPOINT_QUERY, ENDPOINT_STREAM,
    QueryRequest, QueryResponse,
};
use crate::store::types::{Query, QueryResult};

use anyhow::Result;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_millis(250);
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Outbound stub for one peer.
///
/// `is_connected` is a best-effort heuristic: a cached result of the last
/// probe or call, re-probed only while the peer looks down. Callers treat it
/// as a pre-filter and still tolerate `query` failing afterwards.
pub struct NodeClient {
    peer_id: String,
    base_url: String,
    http: reqwest::Client,
    connected: AtomicBool,
}

impl NodeClient {
    /// Creates the stub. Dialing is lazy: the first probe decides the
    /// initial connectivity state, so a peer that comes up later is picked
    /// up by the per-call re-check.
    pub fn new(peer_id: impl Into<String>, address: &str) -> Self {
        Self {
            peer_id: peer_id.into(),
            base_url: format!("http://{}", address),
            http: reqwest::Client::new(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Probes the peer's health endpoint and records the outcome.
    pub async fn probe(&self) -> bool {
        let url = format!("{}{}", self.base_url, ENDPOINT_HEALTH);
        let up = match self.http.get(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        };
        self.connected.store(up, Ordering::Relaxed);
        up
    }

    /// Cheap while the peer looks up; re-probes while it looks down so a
    /// recovered peer rejoins the fan-out.
    pub async fn is_connected(&self) -> bool {
        if self.connected.load(Ordering::Relaxed) {
            return true;
        }
        self.probe().await
    }

    /// Synchronous query against the peer. Transport failures never surface
    /// as errors: they are translated into a failure result so a dead peer
    /// simply contributes nothing to the merge.
    pub async fn query(&self, query: &Query) -> QueryResult {
        let url = format!("{}{}", self.base_url, ENDPOINT_QUERY);
        let request = QueryRequest::from_query(query);

        let response = self
            .http
            .post(url)
            .json(&request)
            .timeout(QUERY_TIMEOUT)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.connected.store(false, Ordering::Relaxed);
                return QueryResult::failure(&query.id, format!("RPC failed: {}", e));
            }
        };

        if !response.status().is_success() {
            self.connected.store(false, Ordering::Relaxed);
            return QueryResult::failure(
                &query.id,
                format!("RPC failed: status {}", response.status()),
            );
        }

        match response.json::<QueryResponse>().await {
            Ok(body) => {
                self.connected.store(true, Ordering::Relaxed);
                body.into_result()
            }
            Err(e) => QueryResult::failure(&query.id, format!("RPC failed: {}", e)),
        }
    }

    /// Fire-and-forget data send, retried with backoff and jitter.
    pub async fn send(&self, source: &str, destination: &str, data: &[u8]) -> Result<()> {
        let url = format!("{}{}", self.base_url, ENDPOINT_DATA);
        let message = DataMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            data: data.to_vec(),
        };

        let mut delay_ms = 150u64;
        let attempts = 3;

        for attempt in 0..attempts {
            let response = self
                .http
                .post(url.clone())
                .json(&message)
                .timeout(SEND_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    self.connected.store(true, Ordering::Relaxed);
                    return Ok(());
                }
                Ok(response) => {
                    self.connected.store(false, Ordering::Relaxed);
                    anyhow::bail!("data send to {} failed: {}", self.peer_id, response.status());
                }
                Err(e) => {
                    if attempt + 1 == attempts {
                        self.connected.store(false, Ordering::Relaxed);
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    /// Streams a query's result chunks, invoking `on_chunk` per chunk as it
    /// arrives. Chunks are newline-delimited JSON.
    pub async fn stream(
        &self,
        query: &Query,
        mut on_chunk: impl FnMut(DataChunk),
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, ENDPOINT_STREAM);
        let request = QueryRequest::from_query(query);

        let response = self
            .http
            .post(url)
            .json(&request)
            .timeout(QUERY_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("stream request failed: {}", response.status());
        }

        let mut body = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(piece) = body.next().await {
            buffer.extend_from_slice(&piece?);
            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<DataChunk>(line) {
                    Ok(chunk) => on_chunk(chunk),
                    Err(e) => tracing::warn!("Dropping malformed stream chunk: {}", e),
                }
            }
        }

        Ok(())
    }
}
