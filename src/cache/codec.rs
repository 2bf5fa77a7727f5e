use crate::store::types::{DataEntry, DataValue, QueryResult};

/// How a `QueryResult` is flattened into a cache payload.
///
/// Intermediate nodes store one line per entry; the portal prefixes the
/// entry lines with a `success,message,count` header so a hit can restore
/// the original outcome wholesale. Both forms round-trip through the owning
/// node's cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheCodec {
    Lines,
    Headered,
}

impl CacheCodec {
    pub fn encode(&self, result: &QueryResult) -> Vec<u8> {
        match self {
            CacheCodec::Lines => encode_entries(&result.entries).into_bytes(),
            CacheCodec::Headered => {
                let mut out = format!(
                    "{},{},{}\n",
                    result.success,
                    result.message,
                    result.entries.len()
                );
                out.push_str(&encode_entries(&result.entries));
                out.into_bytes()
            }
        }
    }

    /// Rebuilds a result from a cached payload. The caller stamps the
    /// message and timing blob afterwards.
    pub fn decode(&self, query_id: &str, payload: &[u8]) -> QueryResult {
        let text = String::from_utf8_lossy(payload);
        match self {
            CacheCodec::Lines => {
                let entries = decode_entries(text.lines());
                QueryResult::success(query_id, entries)
            }
            CacheCodec::Headered => {
                let mut lines = text.lines();
                let Some(header) = lines.next() else {
                    return QueryResult::success(query_id, Vec::new());
                };

                // success,message,count: count is peeled off the right and
                // success off the left, so a comma inside the message would
                // survive even though controlled success messages never
                // carry one.
                let (success, message) = match header
                    .rsplit_once(',')
                    .and_then(|(head, _count)| head.split_once(','))
                {
                    Some((success, message)) => (success == "true", message.to_string()),
                    None => (true, String::new()),
                };

                let mut result =
                    QueryResult::success_with_message(query_id, decode_entries(lines), message);
                result.success = success;
                result
            }
        }
    }
}

/// One `<key>,<type>,<value>` line per entry. Crash records are reduced to a
/// `CrashData:<key>` placeholder; clients must not expect to recover the
/// record from a cache payload.
fn encode_entries(entries: &[DataEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let (type_tag, value) = match &entry.value {
            DataValue::Int(v) => ("int", v.to_string()),
            DataValue::Double(v) => ("double", v.to_string()),
            DataValue::Bool(v) => ("bool", v.to_string()),
            DataValue::Str(v) => ("string", v.clone()),
            DataValue::Bytes(v) => ("string", String::from_utf8_lossy(v).into_owned()),
            DataValue::Crash(_) => ("string", format!("CrashData:{}", entry.key)),
        };
        out.push_str(&entry.key);
        out.push(',');
        out.push_str(type_tag);
        out.push(',');
        out.push_str(&value);
        out.push('\n');
    }
    out
}

fn decode_entries<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<DataEntry> {
    let mut entries = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ',');
        let (Some(key), Some(type_tag), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            tracing::warn!("Skipping malformed cache line: {}", line);
            continue;
        };

        let value = match type_tag {
            "int" => DataValue::Int(value.parse().unwrap_or(0)),
            "double" => DataValue::Double(value.parse().unwrap_or(0.0)),
            "bool" => DataValue::Bool(value == "true" || value == "1"),
            _ => DataValue::Str(value.to_string()),
        };

        entries.push(DataEntry::new(key, value));
    }
    entries
}
