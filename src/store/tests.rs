use crate::store::ingest;
use crate::store::memory::{LocalStore, parse_date_key};
use crate::store::types::{CrashRecord, DataEntry, DataValue, Query};

use std::io::Write;

fn crash(borough: &str, date: &str, injured: i32, killed: i32) -> CrashRecord {
    CrashRecord {
        crash_date: date.to_string(),
        crash_time: "10:00".to_string(),
        borough: borough.to_string(),
        on_street_name: "FLATBUSH AVENUE".to_string(),
        cross_street_name: "ATLANTIC AVENUE".to_string(),
        persons_injured: injured,
        persons_killed: killed,
        ..CrashRecord::default()
    }
}

fn seeded_store() -> LocalStore {
    let store = LocalStore::new();
    store.store(DataEntry::crash("crash_0", crash("BROOKLYN", "12/01/2021", 2, 0)));
    store.store(DataEntry::crash("crash_1", crash("BROOKLYN", "12/15/2021", 0, 1)));
    store.store(DataEntry::crash("crash_2", crash("QUEENS", "01/05/2022", 3, 0)));
    store.store(DataEntry::string("note_0", "not a crash"));
    store
}

fn query(verb: &str, params: &[&str]) -> Query {
    Query::with_id("q-test", verb, params.iter().map(|p| p.to_string()).collect())
}

#[test]
fn test_store_get_remove_roundtrip() {
    let store = LocalStore::new();
    store.store(DataEntry::int("answer", 42));

    let entry = store.get("answer").unwrap();
    assert_eq!(entry.value, DataValue::Int(42));

    // Last writer wins.
    store.store(DataEntry::int("answer", 43));
    assert_eq!(store.get("answer").unwrap().value, DataValue::Int(43));

    assert!(store.remove("answer"));
    assert!(!store.remove("answer"));
    assert!(store.get("answer").is_none());
}

#[test]
fn test_get_all_returns_everything() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_all", &[]));
    assert!(result.success);
    assert_eq!(result.entries.len(), 4);
}

#[test]
fn test_get_by_key_preserves_param_order_and_omits_misses() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_by_key", &["crash_2", "missing", "crash_0"]));
    assert!(result.success);
    let keys: Vec<&str> = result.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["crash_2", "crash_0"]);
}

#[test]
fn test_get_by_prefix() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_by_prefix", &["crash_"]));
    assert!(result.success);
    assert_eq!(result.entries.len(), 3);

    let missing_param = store.evaluate(&query("get_by_prefix", &[]));
    assert!(!missing_param.success);
}

#[test]
fn test_get_by_borough_is_case_insensitive() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_by_borough", &["brooklyn"]));
    assert!(result.success);
    assert_eq!(result.entries.len(), 2);

    let none = store.evaluate(&query("get_by_borough", &["BRONX"]));
    assert!(none.success);
    assert!(none.entries.is_empty());
}

#[test]
fn test_get_by_street_matches_any_street_field() {
    let store = seeded_store();
    let on_street = store.evaluate(&query("get_by_street", &["flatbush"]));
    assert_eq!(on_street.entries.len(), 3);

    let cross_street = store.evaluate(&query("get_by_street", &["ATLANTIC"]));
    assert_eq!(cross_street.entries.len(), 3);

    let nowhere = store.evaluate(&query("get_by_street", &["BROADWAY"]));
    assert!(nowhere.success);
    assert!(nowhere.entries.is_empty());
}

#[test]
fn test_date_range_inclusive_bounds() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_by_date_range", &["12/01/2021", "12/15/2021"]));
    assert!(result.success);
    assert_eq!(result.entries.len(), 2, "both bounds are inclusive");

    let wide = store.evaluate(&query("get_by_date_range", &["01/01/2021", "12/31/2022"]));
    assert_eq!(wide.entries.len(), 3);
}

#[test]
fn test_date_range_rejects_malformed_dates() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_by_date_range", &["13/40/2021", "12/31/2021"]));
    assert!(!result.success);
    assert!(result.message.contains("Invalid date"));
    assert!(result.message.contains("13/40/2021"));

    let short = store.evaluate(&query("get_by_date_range", &["12/01/2021"]));
    assert!(!short.success);
}

#[test]
fn test_date_key_ordering() {
    assert_eq!(parse_date_key("12/13/2021"), Some(20211213));
    assert!(parse_date_key("01/05/2022") > parse_date_key("12/31/2021"));
    assert_eq!(parse_date_key("02/30/2021"), None);
    assert_eq!(parse_date_key("not a date"), None);
}

#[test]
fn test_injury_and_fatality_thresholds() {
    let store = seeded_store();

    // Default threshold is 1.
    let injured = store.evaluate(&query("get_crashes_with_injuries", &[]));
    assert_eq!(injured.entries.len(), 2);

    let badly = store.evaluate(&query("get_crashes_with_injuries", &["3"]));
    assert_eq!(badly.entries.len(), 1);

    let fatal = store.evaluate(&query("get_crashes_with_fatalities", &[]));
    assert_eq!(fatal.entries.len(), 1);

    let bad_param = store.evaluate(&query("get_crashes_with_injuries", &["many"]));
    assert!(!bad_param.success);
    assert!(bad_param.message.contains("many"));
}

#[test]
fn test_get_by_time_is_reserved_empty_success() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_by_time", &["10:00"]));
    assert!(result.success);
    assert!(result.entries.is_empty());
}

#[test]
fn test_unknown_verb_fails_with_exact_message() {
    let store = seeded_store();
    let result = store.evaluate(&query("get_by_moon_phase", &["full"]));
    assert!(!result.success);
    assert_eq!(result.message, "Unknown query: get_by_moon_phase");
}

#[test]
fn test_repeat_evaluation_is_idempotent() {
    let store = seeded_store();
    let first = store.evaluate(&query("get_all", &[]));
    let second = store.evaluate(&query("get_all", &[]));

    let mut first_keys: Vec<String> = first.entries.iter().map(|e| e.key.clone()).collect();
    let mut second_keys: Vec<String> = second.entries.iter().map(|e| e.key.clone()).collect();
    first_keys.sort();
    second_keys.sort();
    assert_eq!(first_keys, second_keys);
}

#[test]
fn test_csv_load_with_quotes_and_empty_ints() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "CRASH DATE,CRASH TIME,BOROUGH,ZIP CODE,LATITUDE,LONGITUDE,LOCATION,ON STREET NAME,CROSS STREET NAME,OFF STREET NAME,INJURED,KILLED,PEDESTRIANS"
    )
    .unwrap();
    writeln!(
        file,
        "12/13/2021,11:10,BROOKLYN,11201,40.69,-73.99,\"(40.69, -73.99)\",FLATBUSH AVENUE,ATLANTIC AVENUE,,2,,1"
    )
    .unwrap();
    writeln!(file, "too,short,row").unwrap();
    writeln!(
        file,
        "01/02/2022,09:30,QUEENS,11101,40.74,-73.93,\"(40.74, -73.93)\",QUEENS BOULEVARD,,,0,1,0"
    )
    .unwrap();

    let store = LocalStore::new();
    let count = ingest::load_csv(&store, file.path()).unwrap();
    assert_eq!(count, 2, "header and short rows are skipped");

    let first = store.get("crash_0").unwrap();
    let DataValue::Crash(record) = &first.value else {
        panic!("expected a crash record");
    };
    assert_eq!(record.location, "(40.69, -73.99)");
    assert_eq!(record.persons_injured, 2);
    assert_eq!(record.persons_killed, 0, "empty cell defaults to 0");

    assert!(store.get("crash_1").is_some());
    assert!(store.get("crash_2").is_none());
}

#[test]
fn test_csv_missing_file_is_an_error() {
    let store = LocalStore::new();
    assert!(ingest::load_csv(&store, "/nonexistent/data.csv").is_err());
}

#[test]
fn test_demo_seed_matches_borough_ownership() {
    let store = LocalStore::new();
    ingest::seed_demo_records(&store, "D");
    let result = store.evaluate(&query("get_by_borough", &["BRONX"]));
    assert_eq!(result.entries.len(), 5);

    let catch_all = LocalStore::new();
    ingest::seed_demo_records(&catch_all, "E");
    assert_eq!(catch_all.len(), 10, "E carries its borough plus the catch-all slice");

    let portal = LocalStore::new();
    ingest::seed_demo_records(&portal, "A");
    assert!(portal.is_empty(), "the portal owns no data");
}
