// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `mpdict bench` command - Multi-process write benchmark.
//!
//! Resets the table, starts `processes - 1` background workers as child
//! processes, runs the foreground worker in this process at the same time,
//! then reports elapsed wall time, the table length and a sample of entries.

use std::process::Stdio;
use std::time::Instant;

use mpdict_core::{Backend, Dictionary, SharedMap};
use serde::Serialize;
use tokio::process::{Child, Command};

use crate::args::TableArgs;
use crate::workload::{self, FOREGROUND_ID};

/// Entries printed after a run.
const SAMPLE_SIZE: usize = 9;

pub struct BenchOptions {
    pub backend: Backend,
    pub processes: usize,
    pub worksize: u64,
    pub json: bool,
    pub destroy: bool,
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
pub struct Sample {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct BenchSummary {
    pub backend: String,
    pub name: String,
    pub processes: usize,
    pub worksize: u64,
    pub per_worker: u64,
    pub elapsed_secs: f64,
    pub len: u64,
    pub samples: Vec<Sample>,
}

pub async fn execute(
    config_file: Option<&str>,
    table: &TableArgs,
    options: BenchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = table.resolve(config_file, options.worksize.max(1))?;
    let ids = workload::background_ids(options.processes)?;
    let per_worker = workload::per_worker(options.worksize, options.processes);

    if !options.json {
        println!(
            "Testing {} on {} processes X {} items...",
            options.backend, options.processes, options.worksize
        );
    }
    if !options.backend.is_shared() && !ids.is_empty() {
        tracing::warn!(
            "The local backend is private to each process; background writes are not counted"
        );
    }

    let dict = options.backend.open(&config.name, &config.table, true)?;
    tracing::debug!(name = %config.name, backend = dict.backend_name(), "Opened table");

    let exe = std::env::current_exe()?;
    let child_table_args = TableArgs::to_child_args(&config);

    let start = Instant::now();

    let mut children: Vec<(String, Child)> = Vec::with_capacity(ids.len());
    for id in &ids {
        let mut cmd = Command::new(&exe);
        if options.verbose {
            cmd.arg("--verbose");
        }
        cmd.arg("worker")
            .arg("--id")
            .arg(id)
            .arg("--count")
            .arg(per_worker.to_string())
            .arg("--backend")
            .arg(options.backend.to_string())
            .args(&child_table_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        tracing::debug!(worker = %id, pid = ?child.id(), "Spawned background worker");
        children.push((id.clone(), child));
    }

    let foreground = tokio::task::spawn_blocking(move || {
        let written = workload::run(dict.as_ref(), FOREGROUND_ID, per_worker);
        (dict, written)
    });

    let (dict, written) = foreground.await?;
    written?;

    let mut failed = Vec::new();
    for (id, mut child) in children {
        let status = child.wait().await?;
        if !status.success() {
            tracing::error!(worker = %id, status = %status, "Background worker failed");
            failed.push(id);
        }
    }
    let elapsed = start.elapsed();

    if !failed.is_empty() {
        return Err(format!("background workers failed: {}", failed.join(", ")).into());
    }

    let summary = summarize(
        dict.as_ref(),
        config.name.as_str(),
        &options,
        per_worker,
        elapsed.as_secs_f64(),
    )?;
    drop(dict);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Elapsed {:.6} seconds", summary.elapsed_secs);
        println!("d[{}]:", summary.len);
        for sample in &summary.samples {
            println!("  {} => {}", sample.key, sample.value);
        }
    }

    if options.destroy && options.backend.is_shared() {
        SharedMap::destroy(&config.name)?;
    }

    Ok(())
}

fn summarize(
    dict: &dyn Dictionary,
    name: &str,
    options: &BenchOptions,
    per_worker: u64,
    elapsed_secs: f64,
) -> Result<BenchSummary, Box<dyn std::error::Error>> {
    let mut samples = Vec::with_capacity(SAMPLE_SIZE);
    for key in dict.keys().into_iter().take(SAMPLE_SIZE) {
        // A key listed by `keys` may be deleted by another process meanwhile.
        if let Some(value) = dict.get(&key)? {
            samples.push(Sample {
                key: String::from_utf8_lossy(&key).into_owned(),
                value: String::from_utf8_lossy(&value).into_owned(),
            });
        }
    }

    Ok(BenchSummary {
        backend: options.backend.to_string(),
        name: name.to_string(),
        processes: options.processes,
        worksize: options.worksize,
        per_worker,
        elapsed_secs,
        len: dict.len(),
        samples,
    })
}
