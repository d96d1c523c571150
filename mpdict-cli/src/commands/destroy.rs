// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mpdict destroy` command - Remove a table from the system.
//!
//! Processes still attached keep an orphaned copy until they exit.

use mpdict_core::{SegmentName, SharedMap};

use crate::args::{TableArgs, DEFAULT_CAPACITY};

pub async fn execute(
    config_file: Option<&str>,
    table: &TableArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    // Only the name matters here; a config file still wins when given.
    let name = match config_file {
        Some(_) => table.resolve(config_file, DEFAULT_CAPACITY)?.name,
        None => SegmentName::new(table.name.as_str())?,
    };

    SharedMap::destroy(&name)?;
    println!("✓ Destroyed table '{}'", name);

    Ok(())
}
