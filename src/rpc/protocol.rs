//! Overlay Wire Protocol
//!
//! Defines the endpoints and Data Transfer Objects for internode
//! communication. These structures are serialized as JSON and sent over
//! HTTP; the conversions at the bottom are the only place internal values
//! and wire values meet.

use crate::store::types::{DataEntry, DataValue, Query, QueryResult, current_timestamp_ms};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Unary query: request in, merged result out.
pub const ENDPOINT_QUERY: &str = "/query";
/// Unary fire-and-forget data message; the response is an empty ack.
pub const ENDPOINT_DATA: &str = "/data";
/// Server-streamed result chunks, one JSON object per line.
pub const ENDPOINT_STREAM: &str = "/stream";
/// Liveness probe used by the connectivity pre-filter.
pub const ENDPOINT_HEALTH: &str = "/health";
/// Node statistics (store/cache sizes, host load).
pub const ENDPOINT_STATS: &str = "/health/stats";

// --- Data Transfer Objects ---

/// A query as it crosses the wire. The `query_id` is the stable correlation
/// identifier for this query across the whole overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query_id: String,
    pub query_string: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// The typed value slot of a wire entry. Crash records do not cross the wire
/// structurally; they are reduced to a string summary first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    #[serde(rename = "string_value")]
    String(String),
    #[serde(rename = "int_value")]
    Int(i32),
    #[serde(rename = "double_value")]
    Double(f64),
    #[serde(rename = "bool_value")]
    Bool(bool),
}

/// One result row on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntry {
    pub key: String,
    pub value: WireValue,
}

impl WireEntry {
    pub fn from_entry(entry: &DataEntry) -> Self {
        let value = match &entry.value {
            DataValue::Int(v) => WireValue::Int(*v),
            DataValue::Double(v) => WireValue::Double(*v),
            DataValue::Bool(v) => WireValue::Bool(*v),
            DataValue::Str(v) => WireValue::String(v.clone()),
            // The wire oneof has no bytes arm.
            DataValue::Bytes(v) => WireValue::String(String::from_utf8_lossy(v).into_owned()),
            DataValue::Crash(crash) => WireValue::String(crash.summary()),
        };
        Self {
            key: entry.key.clone(),
            value,
        }
    }

    pub fn into_entry(self) -> DataEntry {
        let value = match self.value {
            WireValue::Int(v) => DataValue::Int(v),
            WireValue::Double(v) => DataValue::Double(v),
            WireValue::Bool(v) => DataValue::Bool(v),
            WireValue::String(v) => DataValue::Str(v),
        };
        DataEntry {
            key: self.key,
            value,
            timestamp: current_timestamp_ms(),
        }
    }
}

/// The response to a unary query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub results: Vec<WireEntry>,
    #[serde(default)]
    pub timing_data: String,
}

impl QueryResponse {
    pub fn from_result(result: &QueryResult) -> Self {
        Self {
            query_id: result.query_id.clone(),
            success: result.success,
            message: result.message.clone(),
            results: result.entries.iter().map(WireEntry::from_entry).collect(),
            timing_data: result.timing_blob.clone(),
        }
    }

    pub fn into_result(self) -> QueryResult {
        QueryResult {
            query_id: self.query_id,
            success: self.success,
            message: self.message,
            entries: self.results.into_iter().map(WireEntry::into_entry).collect(),
            timing_blob: self.timing_data,
        }
    }
}

/// An out-of-band data message relayed hop by hop toward `destination`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMessage {
    pub message_id: String,
    pub source: String,
    pub destination: String,
    pub data: Vec<u8>,
}

/// One chunk of a streamed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataChunk {
    pub chunk_id: String,
    pub data: Vec<u8>,
    pub is_last: bool,
}

/// Liveness response behind [`ENDPOINT_HEALTH`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub node_id: String,
    pub running: bool,
}

/// Node statistics behind [`ENDPOINT_STATS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatsResponse {
    pub node_id: String,
    pub address: String,
    pub peers: Vec<String>,
    pub store_entries: usize,
    pub cache_entries: usize,
    pub cpu_usage: f32,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
}

impl QueryRequest {
    pub fn from_query(query: &Query) -> Self {
        Self {
            query_id: query.id.clone(),
            query_string: query.verb.clone(),
            parameters: query.params.clone(),
        }
    }

    pub fn into_query(self) -> Query {
        Query {
            id: self.query_id,
            verb: self.query_string,
            params: self.parameters,
        }
    }
}
