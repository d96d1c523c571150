// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The benchmark workload: disjoint single-key writes per worker.
//!
//! Worker `id` writes keys `{id}0`, `{id}1`, ... and stores its 10-byte mark
//! under each, so any sampled entry tells which worker wrote it.

use mpdict_core::{Dictionary, TableError};

/// Background worker ids, in spawn order.
pub const BACKGROUND_IDS: &str = "abcdefghijklnmo";

/// Id of the worker running in the driver process.
pub const FOREGROUND_ID: &str = "Foreground";

pub const MARK_LEN: usize = 10;

/// `id` repeated, cut to `MARK_LEN` bytes.
pub fn mark_for(id: &str) -> String {
    id.repeat(MARK_LEN).chars().take(MARK_LEN).collect()
}

/// Ids for the `processes - 1` background workers.
pub fn background_ids(processes: usize) -> Result<Vec<String>, String> {
    if processes == 0 {
        return Err("at least one process is required".to_string());
    }
    let needed = processes - 1;
    if needed > BACKGROUND_IDS.len() {
        return Err(format!(
            "at most {} processes are supported",
            BACKGROUND_IDS.len() + 1
        ));
    }
    Ok(BACKGROUND_IDS
        .chars()
        .take(needed)
        .map(String::from)
        .collect())
}

/// Keys each worker writes.
pub fn per_worker(worksize: u64, processes: usize) -> u64 {
    worksize / processes.max(1) as u64
}

/// Write `count` keys for worker `id`. Returns the number written.
pub fn run(dict: &dyn Dictionary, id: &str, count: u64) -> Result<u64, TableError> {
    let mark = mark_for(id);
    for i in 0..count {
        let key = format!("{}{}", id, i);
        dict.set(key.as_bytes(), mark.as_bytes())?;
    }
    Ok(count)
}
