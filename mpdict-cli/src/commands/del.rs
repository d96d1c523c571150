// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mpdict del` command - Delete a key.

use mpdict_core::SharedMap;

use crate::args::{TableArgs, DEFAULT_CAPACITY};

pub async fn execute(
    config_file: Option<&str>,
    table: &TableArgs,
    key: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = table.resolve(config_file, DEFAULT_CAPACITY)?;
    let map = SharedMap::attach(&config.name, &config.table)?;

    map.delete(key)?;
    println!("✓ Deleted '{}'", key);

    Ok(())
}
