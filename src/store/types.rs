use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One immutable traffic-crash fact.
///
/// All string fields are free text straight from the dataset; numeric fields
/// default to 0 when the source cell is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub crash_date: String,
    pub crash_time: String,
    pub borough: String,
    pub zip_code: String,
    pub latitude: String,
    pub longitude: String,
    pub location: String,
    pub on_street_name: String,
    pub cross_street_name: String,
    pub off_street_name: String,
    pub persons_injured: i32,
    pub persons_killed: i32,
    pub pedestrians: i32,
}

impl CrashRecord {
    /// The one-line summary a crash record is reduced to when it crosses the
    /// wire or lands in a client-facing value slot.
    pub fn summary(&self) -> String {
        format!(
            "Date: {}, Time: {}, Borough: {}, Killed: {}",
            self.crash_date, self.crash_time, self.borough, self.persons_killed
        )
    }
}

/// A tagged value; the only value shapes the system stores or transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Int(i32),
    Double(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    Crash(CrashRecord),
}

/// A keyed, timestamped value. `key` is unique within a `LocalStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub key: String,
    pub value: DataValue,
    /// Milliseconds since the Unix epoch at creation time.
    pub timestamp: i64,
}

impl DataEntry {
    pub fn new(key: impl Into<String>, value: DataValue) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp: current_timestamp_ms(),
        }
    }

    pub fn int(key: impl Into<String>, value: i32) -> Self {
        Self::new(key, DataValue::Int(value))
    }

    pub fn double(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, DataValue::Double(value))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, DataValue::Bool(value))
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, DataValue::Str(value.into()))
    }

    pub fn crash(key: impl Into<String>, record: CrashRecord) -> Self {
        Self::new(key, DataValue::Crash(record))
    }
}

/// Wall-clock milliseconds; used only for entry bookkeeping, never for cache
/// freshness decisions.
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A read-only query flowing through the overlay.
///
/// `id` is chosen by the client, must be unique per in-flight query, and is
/// the correlation key for timing data across every hop. Nodes treat it as
/// opaque and never reuse another query's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub verb: String,
    pub params: Vec<String>,
}

impl Query {
    pub fn new(verb: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            verb: verb.into(),
            params,
        }
    }

    pub fn with_id(id: impl Into<String>, verb: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            id: id.into(),
            verb: verb.into(),
            params,
        }
    }
}

/// The outcome of a query at one node: the locally merged entries plus the
/// serialized timing ledger for this hop and everything below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: String,
    pub success: bool,
    pub message: String,
    pub entries: Vec<DataEntry>,
    pub timing_blob: String,
}

impl QueryResult {
    pub fn success(query_id: impl Into<String>, entries: Vec<DataEntry>) -> Self {
        Self::success_with_message(query_id, entries, "Success")
    }

    pub fn success_with_message(
        query_id: impl Into<String>,
        entries: Vec<DataEntry>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            success: true,
            message: message.into(),
            entries,
            timing_blob: String::new(),
        }
    }

    pub fn failure(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            success: false,
            message: message.into(),
            entries: Vec::new(),
            timing_blob: String::new(),
        }
    }
}
