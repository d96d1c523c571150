// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mpdict validate` command - Validate configuration file.

use mpdict_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Table '{}':", config.name);
            println!("  Capacity:        {} entries", config.table.capacity());
            println!("  Max key size:    {} bytes", config.table.max_key_bytes());
            println!("  Max value size:  {} bytes", config.table.max_value_bytes());
            println!(
                "  Lock timeout:    {}ms",
                config.table.lock_timeout().as_millis()
            );
            println!("  Slot size:       {} bytes", config.table.slot_size());
            println!("  Segment size:    {} bytes", config.table.segment_size());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration is invalid");
            eprintln!();
            eprintln!("Error: {}", e);
            Err(e.into())
        }
    }
}
