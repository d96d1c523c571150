// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SharedMap - the per-process handle to a shared table.
//!
//! Each process opens its own handle by name; handles are never passed
//! between processes. A process may hold several handles, to the same or to
//! different tables, at once.
//!
//! Consistency: `set` and `delete` are serialized by the table's mutation
//! lock, so concurrent writers on one key leave exactly one value and
//! writers on disjoint keys never lose entries. `get` and iteration are
//! lock-free and may miss an insert that is still in flight. A slot found
//! mid-write is re-read under the lock, so a committed entry is never
//! skipped because another process is updating it; a lookup can then wait
//! up to the lock timeout and fail with `LockTimeout`. An update cut short
//! by its writer's death removes the key.

use crate::config::TableConfig;
use crate::error::{SegmentError, TableError};
use crate::shm::Segment;
use crate::stats::TableStats;
use crate::table::{Iter, RepairReport, Table};
use crate::types::SegmentName;

/// Handle to a shared-memory hash table.
pub struct SharedMap {
    // Declared before `segment`: the table points into the segment's mapping.
    table: Table,
    segment: Segment,
}

impl SharedMap {
    /// Open the table `name`, creating it when absent.
    ///
    /// With `reset` any existing table of that name is discarded first.
    /// Without it, an existing table is attached as-is and must match the
    /// capacity and key/value bounds of `config`.
    pub fn open(name: &SegmentName, config: &TableConfig, reset: bool) -> Result<Self, SegmentError> {
        let segment = Segment::open(name, config, reset)?;
        Ok(Self::from_segment(segment, config))
    }

    /// Attach to an existing table; fails with `SegmentNotFound` if there is none.
    pub fn attach(name: &SegmentName, config: &TableConfig) -> Result<Self, SegmentError> {
        let segment = Segment::attach(name, config)?;
        Ok(Self::from_segment(segment, config))
    }

    fn from_segment(segment: Segment, config: &TableConfig) -> Self {
        // SAFETY: the segment is mapped and validated, and it is stored next
        // to the table so the mapping outlives every access through it.
        let table = unsafe { Table::new(segment.base(), segment.geometry(), config.lock_timeout()) };
        Self { table, segment }
    }

    /// Unmap this process's view. The table itself survives.
    pub fn close(self) {
        drop(self);
    }

    /// Remove the table `name` from the system.
    ///
    /// Processes still attached keep a usable but orphaned mapping until they
    /// close it; nobody opening the name afterwards will see their writes.
    pub fn destroy(name: &SegmentName) -> Result<(), SegmentError> {
        Segment::destroy(name)
    }

    pub fn name(&self) -> &SegmentName {
        self.segment.name()
    }

    /// Insert `key` or replace its value.
    pub fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<(), TableError> {
        self.table.set(key.as_ref(), value.as_ref())
    }

    /// Value stored under `key`, or `TableError::NotFound`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>, TableError> {
        self.table.get(key.as_ref())
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool, TableError> {
        self.table.contains_key(key.as_ref())
    }

    /// Remove `key`, or fail with `TableError::NotFound`.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<(), TableError> {
        self.table.delete(key.as_ref())
    }

    /// Live entries, read from the header in O(1).
    pub fn len(&self) -> u64 {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.table.geometry().capacity
    }

    /// Lazy `(key, value)` pass over all live entries.
    pub fn iter(&self) -> Iter<'_> {
        self.table.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.table.iter().map(|(key, _)| key)
    }

    /// Call `visit` for every live entry in one pass.
    pub fn foreach(&self, mut visit: impl FnMut(&[u8], &[u8])) {
        for (key, value) in self.table.iter() {
            visit(&key, &value);
        }
    }

    /// Break the mutation lock and repair the table.
    ///
    /// For operators: use when the lock holder is hung. Dead holders are
    /// recovered automatically by the next writer.
    pub fn recover(&self) -> RepairReport {
        self.table.force_recover()
    }

    pub fn stats(&self) -> TableStats {
        let geometry = self.table.geometry();
        TableStats {
            name: self.segment.name().to_string(),
            capacity: geometry.capacity,
            len: self.table.len(),
            tombstones: self.table.tombstones(),
            recoveries: self.table.recoveries(),
            lock_holder: self.table.lock_holder(),
            max_key_bytes: geometry.max_key_bytes,
            max_value_bytes: geometry.max_value_bytes,
            slot_size: geometry.slot_size,
            segment_bytes: self.segment.size() as u64,
        }
    }
}

impl<'a> IntoIterator for &'a SharedMap {
    type Item = (Vec<u8>, Vec<u8>);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capacity;

    fn test_name(tag: &str) -> SegmentName {
        SegmentName::new(format!("mpdict-map-{}-{}", std::process::id(), tag)).unwrap()
    }

    #[test]
    fn test_two_handles_share_entries() {
        let name = test_name("handles");
        let config = TableConfig::new(Capacity::new(128).unwrap());
        let writer = SharedMap::open(&name, &config, true).unwrap();
        let reader = SharedMap::attach(&name, &config).unwrap();

        writer.set("k", "v").unwrap();
        assert_eq!(reader.get("k").unwrap(), b"v");
        assert_eq!(reader.len(), 1);

        reader.delete("k").unwrap();
        assert_eq!(writer.get("k"), Err(TableError::NotFound));

        writer.close();
        assert!(reader.is_empty());
        SharedMap::destroy(&name).unwrap();
    }

    #[test]
    fn test_stats_and_foreach() {
        let name = test_name("stats");
        let config = TableConfig::new(Capacity::new(10).unwrap());
        let map = SharedMap::open(&name, &config, true).unwrap();
        map.set("a", "1").unwrap();
        map.set("b", "2").unwrap();
        map.delete("a").unwrap();

        let stats = map.stats();
        assert_eq!(stats.len, 1);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.lock_holder, None);
        assert_eq!(stats.segment_bytes, config.segment_size());
        assert!((stats.load_factor() - 0.1).abs() < f64::EPSILON);

        let mut seen = Vec::new();
        map.foreach(|k, v| seen.push((k.to_vec(), v.to_vec())));
        assert_eq!(seen, vec![(b"b".to_vec(), b"2".to_vec())]);
        assert_eq!((&map).into_iter().count(), 1);

        SharedMap::destroy(&name).unwrap();
    }
}
