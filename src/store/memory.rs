use super::types::{DataEntry, DataValue, Query, QueryResult};

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

/// The node's in-memory row store.
///
/// Single-owner per node. One mutex guards the map; every operation clones
/// data out so no lock is ever held across an RPC. Entry order is whatever
/// the map yields and is not observable through any verb.
pub struct LocalStore {
    data: Mutex<HashMap<String, DataEntry>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Upsert by key, last writer wins.
    pub fn store(&self, entry: DataEntry) {
        let mut data = self.data.lock().unwrap();
        data.insert(entry.key.clone(), entry);
    }

    pub fn get(&self, key: &str) -> Option<DataEntry> {
        let data = self.data.lock().unwrap();
        data.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut data = self.data.lock().unwrap();
        data.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().unwrap().is_empty()
    }

    /// Evaluates a query against the current state. Pure: never forwards,
    /// never touches the cache.
    pub fn evaluate(&self, query: &Query) -> QueryResult {
        match query.verb.as_str() {
            "get_all" => {
                let data = self.data.lock().unwrap();
                QueryResult::success(&query.id, data.values().cloned().collect())
            }

            "get_by_key" => {
                let data = self.data.lock().unwrap();
                // Param order is preserved; keys that miss are omitted.
                let entries = query
                    .params
                    .iter()
                    .filter_map(|key| data.get(key).cloned())
                    .collect();
                QueryResult::success(&query.id, entries)
            }

            "get_by_prefix" => {
                let Some(prefix) = query.params.first() else {
                    return QueryResult::failure(&query.id, "No prefix provided");
                };
                let data = self.data.lock().unwrap();
                let entries = data
                    .values()
                    .filter(|entry| entry.key.starts_with(prefix.as_str()))
                    .cloned()
                    .collect();
                QueryResult::success(&query.id, entries)
            }

            "get_by_borough" => {
                let Some(borough) = query.params.first() else {
                    return QueryResult::failure(&query.id, "No borough provided");
                };
                QueryResult::success(&query.id, self.get_by_borough(borough))
            }

            "get_by_street" => {
                let Some(street) = query.params.first() else {
                    return QueryResult::failure(&query.id, "No street provided");
                };
                let needle = street.to_uppercase();
                let entries = self.filter_crashes(|crash| {
                    crash.on_street_name.to_uppercase().contains(&needle)
                        || crash.cross_street_name.to_uppercase().contains(&needle)
                        || crash.off_street_name.to_uppercase().contains(&needle)
                });
                QueryResult::success(&query.id, entries)
            }

            "get_by_date_range" => {
                if query.params.len() < 2 {
                    return QueryResult::failure(&query.id, "Date range requires two dates");
                }
                let from = match parse_date_key(&query.params[0]) {
                    Some(key) => key,
                    None => {
                        return QueryResult::failure(
                            &query.id,
                            format!("Invalid date: {}", query.params[0]),
                        );
                    }
                };
                let to = match parse_date_key(&query.params[1]) {
                    Some(key) => key,
                    None => {
                        return QueryResult::failure(
                            &query.id,
                            format!("Invalid date: {}", query.params[1]),
                        );
                    }
                };
                let entries = self.filter_crashes(|crash| {
                    parse_date_key(&crash.crash_date)
                        .map(|key| from <= key && key <= to)
                        .unwrap_or(false)
                });
                QueryResult::success(&query.id, entries)
            }

            "get_crashes_with_injuries" => match min_count_param(&query.params) {
                Ok(min) => {
                    let entries = self.filter_crashes(|crash| crash.persons_injured >= min);
                    QueryResult::success(&query.id, entries)
                }
                Err(raw) => {
                    QueryResult::failure(&query.id, format!("Invalid injury count: {}", raw))
                }
            },

            "get_crashes_with_fatalities" => match min_count_param(&query.params) {
                Ok(min) => {
                    let entries = self.filter_crashes(|crash| crash.persons_killed >= min);
                    QueryResult::success(&query.id, entries)
                }
                Err(raw) => {
                    QueryResult::failure(&query.id, format!("Invalid fatality count: {}", raw))
                }
            },

            // Reserved verb: forwardable, but no local policy applies yet.
            "get_by_time" => QueryResult::success(&query.id, Vec::new()),

            unknown => QueryResult::failure(&query.id, format!("Unknown query: {}", unknown)),
        }
    }

    /// All entries whose value is a crash record matching `predicate`.
    fn filter_crashes<F>(&self, predicate: F) -> Vec<DataEntry>
    where
        F: Fn(&super::types::CrashRecord) -> bool,
    {
        let data = self.data.lock().unwrap();
        data.values()
            .filter(|entry| match &entry.value {
                DataValue::Crash(crash) => predicate(crash),
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// Crash entries for a borough, compared case-insensitively.
    pub fn get_by_borough(&self, borough: &str) -> Vec<DataEntry> {
        let wanted = borough.to_uppercase();
        self.filter_crashes(|crash| crash.borough.to_uppercase() == wanted)
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `MM/DD/YYYY` → `YYYY * 10000 + MM * 100 + DD`, the ordering key for date
/// range comparisons. `None` on malformed input.
pub fn parse_date_key(raw: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%m/%d/%Y").ok()?;
    use chrono::Datelike;
    Some(date.year() * 10000 + date.month() as i32 * 100 + date.day() as i32)
}

/// Optional leading threshold parameter, defaulting to 1.
fn min_count_param(params: &[String]) -> Result<i32, String> {
    match params.first() {
        None => Ok(1),
        Some(raw) => raw.trim().parse::<i32>().map_err(|_| raw.clone()),
    }
}
