use crate::timing::ledger::TimingLedger;
use std::time::Duration;

#[test]
fn test_phases_measure_elapsed_since_anchor() {
    let ledger = TimingLedger::new();
    ledger.start("q-1", "B");

    ledger.end("q-1", "Local_Processing");
    std::thread::sleep(Duration::from_millis(15));
    ledger.end("q-1", "Total_Processing");

    let blob = ledger.serialize("q-1");
    let local = phase_seconds(&blob, "Local_Processing").unwrap();
    let total = phase_seconds(&blob, "Total_Processing").unwrap();

    // Both phases share the same anchor, so the later end is strictly
    // larger: these are elapsed-since-start values, not interval lengths.
    assert!(total > local);
    assert!(total >= 0.015);
}

#[test]
fn test_start_overwrites_anchor_and_node() {
    let ledger = TimingLedger::new();
    ledger.start("q-1", "A");
    ledger.end("q-1", "Cache_Access");
    ledger.start("q-1", "B");

    let blob = ledger.serialize("q-1");
    assert!(blob.starts_with("  [Process B]"));
    assert!(!blob.contains("Cache_Access"), "restart discards prior phases");
}

#[test]
fn test_serialize_format() {
    let ledger = TimingLedger::new();
    ledger.start("q-1", "C");
    ledger.end("q-1", "Local_Processing");

    let blob = ledger.serialize("q-1");
    let mut lines = blob.lines();
    assert_eq!(lines.next(), Some("  [Process C]"));

    let phase_line = lines.next().unwrap();
    assert!(phase_line.starts_with("    Local_Processing"));
    assert!(phase_line.ends_with(" seconds"));

    // Phase names are left-justified to width 20, values use 6 decimals.
    let colon = phase_line.find(':').unwrap();
    assert_eq!(colon, 4 + 20);
    let value = phase_line[colon + 1..].trim().strip_suffix(" seconds").unwrap();
    assert_eq!(value.split('.').nth(1).unwrap().len(), 6);
}

#[test]
fn test_downstream_blobs_are_verbatim_and_ordered() {
    let ledger = TimingLedger::new();
    ledger.start("q-1", "B");
    ledger.end("q-1", "Downstream_Queries");
    ledger.attach_downstream("q-1", "  [Process C]\n    Local_Processing    : 0.000100 seconds\n");
    ledger.attach_downstream("q-1", "  [Process D]\n");

    let blob = ledger.serialize("q-1");
    let c_pos = blob.find("[Process C]").unwrap();
    let d_pos = blob.find("[Process D]").unwrap();
    assert!(c_pos < d_pos);
    assert!(blob.contains("    Local_Processing    : 0.000100 seconds\n"));
}

#[test]
fn test_repeated_phase_overwrites_in_place() {
    let ledger = TimingLedger::new();
    ledger.start("q-1", "B");
    ledger.end("q-1", "Local_Processing");
    ledger.end("q-1", "Downstream_Queries");
    std::thread::sleep(Duration::from_millis(5));
    ledger.end("q-1", "Local_Processing");

    let blob = ledger.serialize("q-1");
    let local_pos = blob.find("Local_Processing").unwrap();
    let downstream_pos = blob.find("Downstream_Queries").unwrap();
    assert!(local_pos < downstream_pos, "overwrite keeps first-emission order");
    assert_eq!(blob.matches("Local_Processing").count(), 1);
}

#[test]
fn test_independent_queries_do_not_interfere() {
    let ledger = TimingLedger::new();
    ledger.start("q-1", "B");
    ledger.start("q-2", "B");
    ledger.end("q-1", "Local_Processing");

    assert!(ledger.serialize("q-1").contains("Local_Processing"));
    assert!(!ledger.serialize("q-2").contains("Local_Processing"));
}

#[test]
fn test_clear_and_unknown_query() {
    let ledger = TimingLedger::new();
    ledger.start("q-1", "B");
    ledger.end("q-1", "Local_Processing");
    assert_eq!(ledger.len(), 1);

    ledger.clear("q-1");
    assert!(ledger.is_empty());
    assert_eq!(ledger.serialize("q-1"), "");

    // Ending an unknown query is a no-op, not a panic.
    ledger.end("q-unknown", "Local_Processing");
    assert_eq!(ledger.serialize("q-unknown"), "");

    assert!(ledger.report("q-unknown").contains("No timing data available"));
}

fn phase_seconds(blob: &str, phase: &str) -> Option<f64> {
    blob.lines()
        .find(|line| line.trim_start().starts_with(phase))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|value| value.trim().strip_suffix(" seconds").map(|s| s.to_string()))
        .and_then(|s| s.parse().ok())
}
