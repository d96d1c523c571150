// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Table selection flags shared by every subcommand.

use std::time::Duration;

use clap::Args;
use mpdict_core::{Capacity, Config, ConfigLoader, MpDictResult, SegmentName, TableConfig};

/// Capacity used when neither a flag nor a config file sets one.
pub const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    /// Table name
    #[arg(short, long, default_value = "TestMPDict")]
    pub name: String,

    /// Table capacity in entries
    #[arg(long)]
    pub capacity: Option<u64>,

    /// Longest key the table accepts, in bytes
    #[arg(long, default_value_t = 64)]
    pub max_key_bytes: usize,

    /// Longest value the table accepts, in bytes
    #[arg(long, default_value_t = 64)]
    pub max_value_bytes: usize,

    /// How long a writer waits for a live lock holder
    #[arg(long, default_value_t = 5000)]
    pub lock_timeout_ms: u64,
}

impl TableArgs {
    /// Resolve the table to operate on.
    ///
    /// A configuration file wins over the flags. Without a capacity flag,
    /// `default_capacity` applies.
    pub fn resolve(&self, config_file: Option<&str>, default_capacity: u64) -> MpDictResult<Config> {
        if let Some(path) = config_file {
            return ConfigLoader::load_file(path);
        }

        let name = SegmentName::new(self.name.as_str())?;
        let capacity = Capacity::new(self.capacity.unwrap_or(default_capacity))?;
        let table = TableConfig::new(capacity)
            .with_max_key_bytes(self.max_key_bytes)?
            .with_max_value_bytes(self.max_value_bytes)?
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))?;

        Ok(Config { name, table })
    }

    /// Flags that make a child process resolve exactly `config`.
    pub fn to_child_args(config: &Config) -> Vec<String> {
        vec![
            "--name".to_string(),
            config.name.to_string(),
            "--capacity".to_string(),
            config.table.capacity().to_string(),
            "--max-key-bytes".to_string(),
            config.table.max_key_bytes().to_string(),
            "--max-value-bytes".to_string(),
            config.table.max_value_bytes().to_string(),
            "--lock-timeout-ms".to_string(),
            config.table.lock_timeout().as_millis().to_string(),
        ]
    }
}
