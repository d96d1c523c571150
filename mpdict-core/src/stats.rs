// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use serde::{Deserialize, Serialize};

/// Point-in-time view of a table's header, for operators and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub name: String,
    pub capacity: u64,
    pub len: u64,
    pub tombstones: u64,
    pub recoveries: u64,
    pub lock_holder: Option<u32>,
    pub max_key_bytes: u32,
    pub max_value_bytes: u32,
    pub slot_size: u64,
    pub segment_bytes: u64,
}

impl TableStats {
    /// Fraction of slots holding a live entry.
    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.capacity as f64
    }
}
