use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Instant;

struct TimingInfo {
    node_id: String,
    anchor: Instant,
    /// Phase name → seconds, kept in first-emission order so serialization
    /// reflects the order phases completed.
    phases: Vec<(String, f64)>,
    /// Opaque serialized ledgers from downstream nodes, appended verbatim.
    downstream: Vec<String>,
}

/// The per-node timing ledger, keyed by query id.
///
/// `end` records elapsed-since-`start`, not an interval length: every phase
/// is measured from the single anchor laid down when the query entered the
/// node. This is intentional and part of the public timing format.
pub struct TimingLedger {
    timings: Mutex<HashMap<String, TimingInfo>>,
}

impl TimingLedger {
    pub fn new() -> Self {
        Self {
            timings: Mutex::new(HashMap::new()),
        }
    }

    /// Anchors the stopwatch for `query_id` to now. Repeated calls overwrite
    /// both the anchor and the node id.
    pub fn start(&self, query_id: &str, node_id: &str) {
        let mut timings = self.timings.lock().unwrap();
        timings.insert(
            query_id.to_string(),
            TimingInfo {
                node_id: node_id.to_string(),
                anchor: Instant::now(),
                phases: Vec::new(),
                downstream: Vec::new(),
            },
        );
    }

    /// Records `now - anchor` seconds under `phase`. A repeated phase name
    /// overwrites its value but keeps its original position.
    pub fn end(&self, query_id: &str, phase: &str) {
        let mut timings = self.timings.lock().unwrap();
        if let Some(info) = timings.get_mut(query_id) {
            let seconds = info.anchor.elapsed().as_secs_f64();
            if let Some(slot) = info.phases.iter_mut().find(|(name, _)| name == phase) {
                slot.1 = seconds;
            } else {
                info.phases.push((phase.to_string(), seconds));
            }
        }
    }

    /// Appends a downstream node's serialized ledger, verbatim.
    pub fn attach_downstream(&self, query_id: &str, blob: &str) {
        let mut timings = self.timings.lock().unwrap();
        if let Some(info) = timings.get_mut(query_id) {
            info.downstream.push(blob.to_string());
        }
    }

    /// The transmissible block for this node: a `[Process <id>]` header, one
    /// line per phase, then the downstream blobs verbatim.
    pub fn serialize(&self, query_id: &str) -> String {
        let timings = self.timings.lock().unwrap();
        let Some(info) = timings.get(query_id) else {
            return String::new();
        };

        let mut out = String::new();
        let _ = writeln!(out, "  [Process {}]", info.node_id);
        for (phase, seconds) in &info.phases {
            let _ = writeln!(out, "    {:<20}: {:.6} seconds", phase, seconds);
        }
        for blob in &info.downstream {
            out.push_str(blob);
        }
        out
    }

    /// The human-readable report printed at the portal console.
    pub fn report(&self, query_id: &str) -> String {
        let timings = self.timings.lock().unwrap();
        let Some(info) = timings.get(query_id) else {
            return format!("No timing data available for query {}", query_id);
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Timing Report for Query {} (Process {}):",
            query_id, info.node_id
        );
        let _ = writeln!(out, "Local Operations:");
        for (phase, seconds) in &info.phases {
            let _ = writeln!(out, "  {:<20}: {:.6} seconds", phase, seconds);
        }
        if !info.downstream.is_empty() {
            let _ = writeln!(out, "\nDownstream Processes:");
            for blob in &info.downstream {
                out.push_str(blob);
            }
        }
        out
    }

    pub fn clear(&self, query_id: &str) {
        let mut timings = self.timings.lock().unwrap();
        timings.remove(query_id);
    }

    /// Number of queries currently tracked; used at shutdown to report what
    /// is being flushed.
    pub fn len(&self) -> usize {
        self.timings.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.lock().unwrap().is_empty()
    }
}

impl Default for TimingLedger {
    fn default() -> Self {
        Self::new()
    }
}
