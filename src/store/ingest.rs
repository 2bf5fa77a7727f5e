use super::memory::LocalStore;
use super::types::{CrashRecord, DataEntry};

use anyhow::{Context, Result};
use std::path::Path;

/// Loads crash records from a CSV export into the store.
///
/// The first row is a header and is skipped; each subsequent row maps
/// positionally onto the 13 `CrashRecord` columns. Rows are stored under
/// synthetic keys `crash_<i>`, with `i` counting from 0 within this call.
/// Returns the number of rows stored.
pub fn load_csv(store: &LocalStore, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open data file: {}", path.display()))?;

    let mut count = 0usize;
    for (line_no, line) in raw.lines().enumerate() {
        if line_no == 0 || line.trim().is_empty() {
            continue;
        }

        let fields = split_csv_line(line);
        if fields.len() < 13 {
            tracing::warn!(
                "Skipping malformed row {} in {}: {} of 13 columns",
                line_no + 1,
                path.display(),
                fields.len()
            );
            continue;
        }

        let record = CrashRecord {
            crash_date: fields[0].clone(),
            crash_time: fields[1].clone(),
            borough: fields[2].clone(),
            zip_code: fields[3].clone(),
            latitude: fields[4].clone(),
            longitude: fields[5].clone(),
            location: fields[6].clone(),
            on_street_name: fields[7].clone(),
            cross_street_name: fields[8].clone(),
            off_street_name: fields[9].clone(),
            persons_injured: lenient_int(&fields[10]),
            persons_killed: lenient_int(&fields[11]),
            pedestrians: lenient_int(&fields[12]),
        };

        store.store(DataEntry::crash(format!("crash_{}", count), record));
        count += 1;
    }

    tracing::info!("Loaded {} crash records from {}", count, path.display());
    Ok(count)
}

/// Splits one CSV line, honoring double-quoted fields (the dataset quotes
/// the location column, which contains a comma).
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Integer cells tolerate empty strings and junk, defaulting to 0.
fn lenient_int(raw: &str) -> i32 {
    raw.trim().parse().unwrap_or(0)
}

/// Seeds a handful of demo records for a node's authoritative borough so a
/// cluster started without data files still answers queries.
pub fn seed_demo_records(store: &LocalStore, node_id: &str) {
    let (borough, street, cross) = match node_id {
        "B" => ("BROOKLYN", "FLATBUSH AVENUE", "ATLANTIC AVENUE"),
        "C" => ("QUEENS", "QUEENS BOULEVARD", "ROOSEVELT AVENUE"),
        "D" => ("BRONX", "GRAND CONCOURSE", "FORDHAM ROAD"),
        "E" => ("STATEN ISLAND", "VICTORY BOULEVARD", "BAY STREET"),
        _ => return,
    };

    let prefix = format!("{}_crash", borough.to_lowercase().replace(' ', "_"));
    for i in 0..5 {
        let record = CrashRecord {
            crash_date: "12/13/2021".to_string(),
            crash_time: format!("11:{}0", i),
            borough: borough.to_string(),
            zip_code: "10000".to_string(),
            latitude: "40.6423".to_string(),
            longitude: "-74.0841".to_string(),
            location: "(40.6423, -74.0841)".to_string(),
            on_street_name: street.to_string(),
            cross_street_name: cross.to_string(),
            off_street_name: String::new(),
            persons_injured: i % 3,
            persons_killed: if i % 4 == 0 { 1 } else { 0 },
            pedestrians: i % 2,
        };
        store.store(DataEntry::crash(format!("{}_{}", prefix, i), record));
    }

    // E also carries the catch-all slice: records with no borough at all.
    if node_id == "E" {
        for i in 0..5 {
            let record = CrashRecord {
                crash_date: "12/10/2021".to_string(),
                crash_time: format!("12:{}0", i),
                borough: String::new(),
                zip_code: "10000".to_string(),
                latitude: "40.7500".to_string(),
                longitude: "-73.9500".to_string(),
                location: "(40.7500, -73.9500)".to_string(),
                on_street_name: "UNKNOWN STREET".to_string(),
                cross_street_name: "SOMEWHERE AVE".to_string(),
                off_street_name: String::new(),
                persons_injured: i,
                persons_killed: 0,
                pedestrians: i % 2,
            };
            store.store(DataEntry::crash(format!("other_crash_{}", i), record));
        }
    }

    tracing::info!("Seeded demo crash records for node {}", node_id);
}
