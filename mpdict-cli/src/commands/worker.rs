// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mpdict worker` command - One background worker of a benchmark run.
//!
//! Spawned by `mpdict bench`. Attaches to the table the driver created and
//! writes this worker's share of keys.

use std::time::Instant;

use mpdict_core::{Backend, Dictionary, LocalMap, SharedMap};

use crate::args::{TableArgs, DEFAULT_CAPACITY};
use crate::workload;

pub async fn execute(
    config_file: Option<&str>,
    table: &TableArgs,
    backend: Backend,
    id: &str,
    count: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = table.resolve(config_file, DEFAULT_CAPACITY)?;

    let dict: Box<dyn Dictionary> = match backend {
        Backend::Shm => Box::new(SharedMap::attach(&config.name, &config.table)?),
        Backend::Local => Box::new(LocalMap::new()),
    };

    let start = Instant::now();
    let id_owned = id.to_string();
    let written =
        tokio::task::spawn_blocking(move || workload::run(dict.as_ref(), &id_owned, count))
            .await??;

    tracing::info!(
        worker = %id,
        written,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Worker finished"
    );

    Ok(())
}
