// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Throwaway tables and deterministic keys for benchmarks.

use mpdict_core::{
    Backend, Capacity, Dictionary, LocalMap, MpDictResult, SegmentName, SharedMap, TableConfig,
};
use uuid::Uuid;

/// Longest key produced by `key_for`.
pub const KEY_BYTES: usize = 24;

/// Key for iteration `i`.
pub fn key_for(i: u64) -> String {
    format!("key{:016}", i)
}

/// Key for iteration `i` of thread `thread`.
pub fn thread_key(thread: usize, i: u64) -> String {
    format!("t{:03}-{:016}", thread, i)
}

/// A value of `size` bytes.
pub fn value_of(size: usize) -> Vec<u8> {
    vec![0xAB; size]
}

/// A shared table under a random name, destroyed on drop.
pub struct BenchTable {
    name: SegmentName,
    config: TableConfig,
    map: SharedMap,
}

impl BenchTable {
    pub fn create(capacity: u64, max_value_bytes: usize) -> MpDictResult<Self> {
        let name = SegmentName::new(format!("mpdict-bench-{}", Uuid::new_v4().simple()))?;
        let config = TableConfig::new(Capacity::new(capacity.max(1))?)
            .with_max_key_bytes(KEY_BYTES)?
            .with_max_value_bytes(max_value_bytes.max(1))?;
        let map = SharedMap::open(&name, &config, true)?;
        Ok(Self { name, config, map })
    }

    pub fn map(&self) -> &SharedMap {
        &self.map
    }

    /// A second handle to the same table, as another process would open.
    pub fn attach(&self) -> MpDictResult<SharedMap> {
        Ok(SharedMap::attach(&self.name, &self.config)?)
    }
}

impl Drop for BenchTable {
    fn drop(&mut self) {
        let _ = SharedMap::destroy(&self.name);
    }
}

/// Backend under test, owning whatever it needs to stay alive.
pub enum BenchDict {
    Shm(BenchTable),
    Local(LocalMap),
}

impl BenchDict {
    pub fn create(backend: Backend, capacity: u64, max_value_bytes: usize) -> MpDictResult<Self> {
        match backend {
            Backend::Shm => Ok(BenchDict::Shm(BenchTable::create(capacity, max_value_bytes)?)),
            Backend::Local => Ok(BenchDict::Local(LocalMap::new())),
        }
    }

    pub fn dictionary(&self) -> &dyn Dictionary {
        match self {
            BenchDict::Shm(table) => table.map(),
            BenchDict::Local(map) => map,
        }
    }

    /// Write `count` entries with keys `key_for(0..count)`.
    pub fn prefill(&self, count: u64, value: &[u8]) -> MpDictResult<()> {
        let dict = self.dictionary();
        for i in 0..count {
            dict.set(key_for(i).as_bytes(), value)?;
        }
        Ok(())
    }
}
