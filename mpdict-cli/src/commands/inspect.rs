// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mpdict inspect` command - Show table statistics.

use mpdict_core::{SharedMap, TableStats};
use serde::Serialize;

use crate::args::{TableArgs, DEFAULT_CAPACITY};

#[derive(Serialize)]
struct EntryView {
    key: String,
    value: String,
}

/// JSON output: the stats fields, plus the listed entries when requested.
#[derive(Serialize)]
struct InspectReport {
    #[serde(flatten)]
    stats: TableStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entries: Vec<EntryView>,
}

pub async fn execute(
    config_file: Option<&str>,
    table: &TableArgs,
    entries: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = table.resolve(config_file, DEFAULT_CAPACITY)?;
    let map = SharedMap::attach(&config.name, &config.table)?;
    let stats = map.stats();

    if json {
        let entries = map
            .iter()
            .take(entries)
            .map(|(key, value)| EntryView {
                key: String::from_utf8_lossy(&key).into_owned(),
                value: String::from_utf8_lossy(&value).into_owned(),
            })
            .collect();
        let report = InspectReport { stats, entries };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Table '{}'", stats.name);
    println!("  Entries:       {} / {}", stats.len, stats.capacity);
    println!("  Load factor:   {:.1}%", stats.load_factor() * 100.0);
    println!("  Tombstones:    {}", stats.tombstones);
    println!("  Recoveries:    {}", stats.recoveries);
    match stats.lock_holder {
        Some(pid) => println!("  Lock holder:   pid {}", pid),
        None => println!("  Lock holder:   none"),
    }
    println!(
        "  Key / value:   {} / {} bytes max",
        stats.max_key_bytes, stats.max_value_bytes
    );
    println!("  Slot size:     {} bytes", stats.slot_size);
    println!("  Segment size:  {} bytes", stats.segment_bytes);

    if entries > 0 {
        println!();
        for (key, value) in map.iter().take(entries) {
            println!(
                "  {} => {}",
                String::from_utf8_lossy(&key),
                String::from_utf8_lossy(&value)
            );
        }
    }

    Ok(())
}
