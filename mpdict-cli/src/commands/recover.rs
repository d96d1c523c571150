// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mpdict recover` command - Break the mutation lock and repair the table.
//!
//! For a writer that is hung while holding the lock. A writer that died is
//! recovered automatically by the next one, so this is rarely needed.

use mpdict_core::SharedMap;

use crate::args::{TableArgs, DEFAULT_CAPACITY};

pub async fn execute(
    config_file: Option<&str>,
    table: &TableArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = table.resolve(config_file, DEFAULT_CAPACITY)?;
    let map = SharedMap::attach(&config.name, &config.table)?;

    let holder = map.stats().lock_holder;
    let report = map.recover();

    println!("✓ Recovered table '{}'", config.name);
    match holder {
        Some(pid) => println!("  Previous lock holder: {}", pid),
        None => println!("  Previous lock holder: none"),
    }
    if let Some(slot) = report.in_flight {
        println!("  In-flight slot:       {}", slot);
    }
    println!("  Torn slots repaired:  {}", report.torn_slots);
    println!("  Live entries:         {}", report.live);
    println!("  Tombstones:           {}", report.tombstones);

    Ok(())
}
