// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixed-capacity open-addressing hash table embedded in a segment.
//!
//! Mutations (`set`, `delete`) run under the header's mutation lock.
//! Reads (`get`, iteration) take no lock and rely on per-slot sequence
//! counters. A lookup racing with an insert of the same key may miss it
//! (the slot is still empty when probed). A slot that stays mid-write for
//! the whole read window is re-read under the mutation lock, so a stalled
//! writer is waited out (up to the lock timeout) and a dead one is repaired
//! first. Writes committed before the lookup started are always seen, except
//! that an update interrupted by its writer's death removes the key.

pub mod hash;
pub mod layout;
pub mod lock;
pub mod slot;

use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::Serialize;

use crate::error::TableError;
use hash::ProbeSeq;
use layout::{Geometry, Header, SlotState};
use lock::{Acquired, LockGuard};
use slot::{EntryCopy, Slot};

/// Outcome of probing for a key under the lock.
enum Probe {
    Found(u64),
    Vacant { index: u64, reclaims_tombstone: bool },
    Full,
}

/// Result of a repair pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Slot recorded as in flight by the previous holder.
    pub in_flight: Option<u64>,
    /// Slots found mid-write and tombstoned.
    pub torn_slots: u64,
    /// Live entries after the rebuild.
    pub live: u64,
    /// Tombstones after the rebuild.
    pub tombstones: u64,
}

/// The table proper: header and slot array at a mapped base address.
pub struct Table {
    base: NonNull<u8>,
    geometry: Geometry,
    lock_timeout: Duration,
}

// SAFETY: All shared state is reached through atomics, the mutation lock and
// seqlock-validated copies.
unsafe impl Send for Table {}
unsafe impl Sync for Table {}

impl Table {
    /// # Safety
    ///
    /// `base` must point to a mapped, initialized segment matching `geometry`
    /// that outlives the returned table.
    pub unsafe fn new(base: NonNull<u8>, geometry: Geometry, lock_timeout: Duration) -> Self {
        Self {
            base,
            geometry,
            lock_timeout,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn header(&self) -> &Header {
        // SAFETY: the header sits at offset 0 of a mapped segment
        unsafe { &*(self.base.as_ptr() as *const Header) }
    }

    pub fn slot(&self, index: u64) -> Slot<'_> {
        debug_assert!(index < self.geometry.capacity);
        // SAFETY: index is below capacity, base is a mapped segment
        unsafe { Slot::at(self.base.as_ptr(), &self.geometry, index) }
    }

    pub fn len(&self) -> u64 {
        self.header().count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tombstones(&self) -> u64 {
        self.header().tombstones.load(Ordering::Acquire)
    }

    pub fn recoveries(&self) -> u64 {
        self.header().recoveries.load(Ordering::Acquire)
    }

    pub fn lock_holder(&self) -> Option<u32> {
        lock::holder(&self.header().lock)
    }

    fn check_key(&self, key: &[u8]) -> Result<(), TableError> {
        let max = self.geometry.max_key_bytes as usize;
        if key.len() > max {
            return Err(TableError::KeyTooLong {
                len: key.len(),
                max,
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> Result<(), TableError> {
        let max = self.geometry.max_value_bytes as usize;
        if value.len() > max {
            return Err(TableError::ValueTooLong {
                len: value.len(),
                max,
            });
        }
        Ok(())
    }

    // -- Locking --------------------------------------------------------------

    fn lock(&self) -> Result<LockGuard<'_>, TableError> {
        let (guard, how) = lock::acquire(&self.header().lock, self.lock_timeout)?;
        if let Acquired::TakenOver { dead_holder } = how {
            let report = self.repair();
            tracing::warn!(
                dead_holder,
                in_flight = ?report.in_flight,
                torn_slots = report.torn_slots,
                live = report.live,
                "Repaired table after lock holder died"
            );
        }
        Ok(guard)
    }

    /// Break the lock regardless of its holder and repair the table.
    ///
    /// Only safe when the holder is known to be hung or gone: a holder that
    /// later resumes would race with other writers.
    pub fn force_recover(&self) -> RepairReport {
        let (_guard, previous) = lock::force(&self.header().lock);
        let report = self.repair();
        tracing::warn!(
            previous_holder = previous,
            torn_slots = report.torn_slots,
            live = report.live,
            "Forced table recovery"
        );
        report
    }

    /// Tombstone torn slots and rebuild the counters. Lock must be held.
    fn repair(&self) -> RepairReport {
        let header = self.header();
        let in_flight = match header.intent.swap(0, Ordering::AcqRel) {
            0 => None,
            marked => Some(marked - 1),
        };

        let mut torn_slots = 0;
        let mut live = 0;
        let mut tombstones = 0;
        for index in 0..self.geometry.capacity {
            let slot = self.slot(index);
            if slot.repair_torn() {
                torn_slots += 1;
            }
            match slot.state() {
                SlotState::Occupied => live += 1,
                SlotState::Tombstone => tombstones += 1,
                SlotState::Empty => {}
            }
        }

        header.count.store(live, Ordering::Release);
        header.tombstones.store(tombstones, Ordering::Release);
        header.recoveries.fetch_add(1, Ordering::AcqRel);

        RepairReport {
            in_flight,
            torn_slots,
            live,
            tombstones,
        }
    }

    // -- Mutations --------------------------------------------------------------

    /// Probe for `key` while holding the lock. Remembers the first tombstone
    /// so an insert can reuse it once the chain is known not to hold the key.
    fn probe_locked(&self, key: &[u8]) -> Probe {
        let mut first_tombstone = None;
        for index in ProbeSeq::new(key, self.geometry.capacity) {
            let slot = self.slot(index);
            match slot.state() {
                SlotState::Empty => {
                    return match first_tombstone {
                        Some(index) => Probe::Vacant {
                            index,
                            reclaims_tombstone: true,
                        },
                        None => Probe::Vacant {
                            index,
                            reclaims_tombstone: false,
                        },
                    };
                }
                SlotState::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                SlotState::Occupied => {
                    if slot.key_eq(key) {
                        return Probe::Found(index);
                    }
                }
            }
        }
        match first_tombstone {
            Some(index) => Probe::Vacant {
                index,
                reclaims_tombstone: true,
            },
            None => Probe::Full,
        }
    }

    fn mark_intent(&self, index: u64) {
        self.header().intent.store(index + 1, Ordering::Release);
    }

    fn clear_intent(&self) {
        self.header().intent.store(0, Ordering::Release);
    }

    /// Insert or update. Bounds are checked before the table is touched.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        self.check_key(key)?;
        self.check_value(value)?;

        let _guard = self.lock()?;
        let header = self.header();

        match self.probe_locked(key) {
            Probe::Found(index) => {
                self.mark_intent(index);
                self.slot(index).write_value(key, value);
                self.clear_intent();
            }
            Probe::Vacant {
                index,
                reclaims_tombstone,
            } => {
                self.mark_intent(index);
                self.slot(index).write_entry(key, value);
                header.count.fetch_add(1, Ordering::AcqRel);
                if reclaims_tombstone {
                    header.tombstones.fetch_sub(1, Ordering::AcqRel);
                }
                self.clear_intent();
            }
            Probe::Full => {
                return Err(TableError::CapacityExceeded {
                    capacity: self.geometry.capacity,
                });
            }
        }
        Ok(())
    }

    /// Tombstone the slot holding `key`.
    pub fn delete(&self, key: &[u8]) -> Result<(), TableError> {
        self.check_key(key)?;

        let _guard = self.lock()?;
        let header = self.header();

        match self.probe_locked(key) {
            Probe::Found(index) => {
                self.mark_intent(index);
                self.slot(index).write_tombstone();
                header.count.fetch_sub(1, Ordering::AcqRel);
                header.tombstones.fetch_add(1, Ordering::AcqRel);
                self.clear_intent();
                Ok(())
            }
            Probe::Vacant { .. } | Probe::Full => Err(TableError::NotFound),
        }
    }

    // -- Lock-free reads ----------------------------------------------------------

    /// Look up `key` without taking the lock.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, TableError> {
        self.check_key(key)?;

        enum Seen {
            Empty,
            Skip,
            Hit(EntryCopy),
        }

        let mut busy = false;
        for index in ProbeSeq::new(key, self.geometry.capacity) {
            let slot = self.slot(index);
            let seen = slot.read_consistent(|s| match s.state() {
                SlotState::Empty => Seen::Empty,
                SlotState::Tombstone => Seen::Skip,
                SlotState::Occupied if s.key_eq(key) => Seen::Hit(s.copy_entry()),
                SlotState::Occupied => Seen::Skip,
            });

            match seen {
                Some(Seen::Empty) => break,
                Some(Seen::Hit(entry)) => return Self::checked_value(index, entry),
                Some(Seen::Skip) => {}
                // The key may live in this slot; settle it under the lock.
                None => busy = true,
            }
        }

        if busy {
            tracing::debug!("Lookup hit a busy slot, retrying under the lock");
            return self.get_locked(key);
        }
        Err(TableError::NotFound)
    }

    /// Look up `key` with the mutation lock held.
    fn get_locked(&self, key: &[u8]) -> Result<Vec<u8>, TableError> {
        let _guard = self.lock()?;
        match self.probe_locked(key) {
            Probe::Found(index) => Self::checked_value(index, self.slot(index).copy_entry()),
            Probe::Vacant { .. } | Probe::Full => Err(TableError::NotFound),
        }
    }

    /// Copy slot `index` with the mutation lock held, if it is occupied.
    fn copy_locked(&self, index: u64) -> Result<Option<EntryCopy>, TableError> {
        let _guard = self.lock()?;
        let slot = self.slot(index);
        Ok(match slot.state() {
            SlotState::Occupied => Some(slot.copy_entry()),
            _ => None,
        })
    }

    fn checked_value(index: u64, entry: EntryCopy) -> Result<Vec<u8>, TableError> {
        if !entry.is_intact() {
            return Err(TableError::Corrupted {
                slot: index,
                reason: "checksum mismatch".to_string(),
            });
        }
        Ok(entry.value)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool, TableError> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(TableError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lazy pass over the slot array.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            table: self,
            next: 0,
        }
    }
}

/// Lazy, finite iterator over live entries.
///
/// Visits each slot at most once. Entries inserted or deleted during the
/// pass may or may not be reported. A slot that stays mid-write for the
/// whole read window is re-read under the mutation lock; entries failing
/// their checksum are skipped.
pub struct Iter<'a> {
    table: &'a Table,
    next: u64,
}

impl Iterator for Iter<'_> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.table.geometry.capacity {
            let index = self.next;
            self.next += 1;

            let slot = self.table.slot(index);
            let copy = slot
                .read_consistent(|s| match s.state() {
                    SlotState::Occupied => Some(s.copy_entry()),
                    _ => None,
                })
                .map(Ok)
                .unwrap_or_else(|| self.table.copy_locked(index));

            match copy {
                Ok(Some(entry)) if entry.is_intact() => return Some((entry.key, entry.value)),
                Ok(Some(_)) => {
                    tracing::warn!(slot = index, "Skipping entry with bad checksum");
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(slot = index, %error, "Skipping busy slot during iteration");
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.geometry.capacity - self.next;
        (0, Some(remaining as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::types::Capacity;
    use std::collections::HashSet;

    /// Heap-backed table for tests that do not need a real segment.
    struct HeapTable {
        _buf: Vec<u64>,
        table: Table,
    }

    fn heap_table(capacity: u64, key_bytes: usize, value_bytes: usize) -> HeapTable {
        let config = TableConfig::new(Capacity::new(capacity).unwrap())
            .with_max_key_bytes(key_bytes)
            .unwrap()
            .with_max_value_bytes(value_bytes)
            .unwrap();
        let geometry = Geometry::from_config(&config);
        let mut buf = vec![0u64; geometry.total_size as usize / 8 + 1];
        let base = NonNull::new(buf.as_mut_ptr() as *mut u8).unwrap();
        unsafe { Header::init(base.as_ptr() as *mut Header, &geometry) };
        let table = unsafe { Table::new(base, geometry, Duration::from_millis(500)) };
        HeapTable { _buf: buf, table }
    }

    /// Keys whose probe sequences all start at the same slot.
    fn colliding_keys(capacity: u64, n: usize) -> Vec<Vec<u8>> {
        let target = hash::hash_key(b"k0") % capacity;
        (0..)
            .map(|i| format!("k{}", i).into_bytes())
            .filter(|k| hash::hash_key(k) % capacity == target)
            .take(n)
            .collect()
    }

    #[test]
    fn test_set_get_update() {
        let t = heap_table(16, 16, 16);
        t.table.set(b"alpha", b"1").unwrap();
        t.table.set(b"beta", b"2").unwrap();
        assert_eq!(t.table.get(b"alpha").unwrap(), b"1");
        assert_eq!(t.table.len(), 2);

        t.table.set(b"alpha", b"updated").unwrap();
        assert_eq!(t.table.get(b"alpha").unwrap(), b"updated");
        assert_eq!(t.table.len(), 2);
        assert_eq!(t.table.get(b"gamma"), Err(TableError::NotFound));
    }

    #[test]
    fn test_empty_key_and_value() {
        let t = heap_table(4, 8, 8);
        t.table.set(b"", b"").unwrap();
        assert_eq!(t.table.get(b"").unwrap(), b"");
        assert!(t.table.contains_key(b"").unwrap());
    }

    #[test]
    fn test_bounds_rejected_without_mutation() {
        let t = heap_table(4, 4, 4);
        assert_eq!(
            t.table.set(b"toolong", b"v"),
            Err(TableError::KeyTooLong { len: 7, max: 4 })
        );
        assert_eq!(
            t.table.set(b"k", b"toolong"),
            Err(TableError::ValueTooLong { len: 7, max: 4 })
        );
        assert_eq!(t.table.len(), 0);
        assert_eq!(t.table.iter().count(), 0);
    }

    #[test]
    fn test_capacity_exceeded_leaves_entries() {
        let t = heap_table(3, 8, 8);
        for k in [b"a", b"b", b"c"] {
            t.table.set(k, k).unwrap();
        }
        assert_eq!(
            t.table.set(b"d", b"d"),
            Err(TableError::CapacityExceeded { capacity: 3 })
        );
        assert_eq!(t.table.len(), 3);
        for k in [b"a", b"b", b"c"] {
            assert_eq!(t.table.get(k).unwrap(), k.to_vec());
        }
        // Updating an existing key still works on a full table.
        t.table.set(b"a", b"new").unwrap();
        assert_eq!(t.table.get(b"a").unwrap(), b"new");
    }

    #[test]
    fn test_delete_keeps_probe_chain() {
        let t = heap_table(32, 8, 8);
        let keys = colliding_keys(32, 3);
        for k in &keys {
            t.table.set(k, b"v").unwrap();
        }

        t.table.delete(&keys[0]).unwrap();
        assert_eq!(t.table.get(&keys[0]), Err(TableError::NotFound));
        assert_eq!(t.table.get(&keys[1]).unwrap(), b"v");
        assert_eq!(t.table.get(&keys[2]).unwrap(), b"v");
        assert_eq!(t.table.len(), 2);
        assert_eq!(t.table.tombstones(), 1);
        assert_eq!(t.table.delete(&keys[0]), Err(TableError::NotFound));
    }

    #[test]
    fn test_tombstone_reused_without_duplicating() {
        let t = heap_table(32, 8, 8);
        let keys = colliding_keys(32, 3);
        for k in &keys {
            t.table.set(k, b"old").unwrap();
        }
        t.table.delete(&keys[0]).unwrap();

        // keys[2] lives past the tombstone: updating it must not create a copy.
        t.table.set(&keys[2], b"new").unwrap();
        assert_eq!(t.table.len(), 2);
        assert_eq!(t.table.tombstones(), 1);

        // A fresh key reclaims the tombstone.
        let fresh = colliding_keys(32, 4).pop().unwrap();
        t.table.set(&fresh, b"fresh").unwrap();
        assert_eq!(t.table.tombstones(), 0);
        assert_eq!(t.table.len(), 3);

        let keys_seen: Vec<Vec<u8>> = t.table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys_seen.len(), 3);
        assert_eq!(keys_seen.iter().filter(|k| **k == keys[2]).count(), 1);
    }

    #[test]
    fn test_full_table_of_tombstones_accepts_insert() {
        let t = heap_table(2, 8, 8);
        t.table.set(b"x", b"1").unwrap();
        t.table.set(b"y", b"2").unwrap();
        t.table.delete(b"x").unwrap();
        t.table.delete(b"y").unwrap();

        // No empty slot remains; lookups must terminate and inserts must reuse.
        assert_eq!(t.table.get(b"z"), Err(TableError::NotFound));
        t.table.set(b"z", b"3").unwrap();
        assert_eq!(t.table.get(b"z").unwrap(), b"3");
    }

    #[test]
    fn test_iter_visits_each_entry_once() {
        let t = heap_table(64, 8, 8);
        for i in 0..40 {
            t.table.set(format!("k{}", i).as_bytes(), b"v").unwrap();
        }
        let keys: Vec<Vec<u8>> = t.table.iter().map(|(k, _)| k).collect();
        let unique: HashSet<Vec<u8>> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), 40);
        assert_eq!(unique.len(), 40);
    }

    #[test]
    fn test_corrupted_entry_reported() {
        let t = heap_table(8, 8, 8);
        t.table.set(b"key", b"value").unwrap();
        let index = ProbeSeq::new(b"key", 8).next().unwrap();
        let slot = t.table.slot(index);
        // Flip a stored checksum bit behind the table's back.
        let header = unsafe {
            &*(t.table.base.as_ptr().add(t.table.geometry.slot_offset(index))
                as *const layout::SlotHeader)
        };
        header.checksum.fetch_xor(1, Ordering::Relaxed);
        assert_eq!(slot.state(), SlotState::Occupied);

        assert!(matches!(
            t.table.get(b"key"),
            Err(TableError::Corrupted { .. })
        ));
        assert_eq!(t.table.iter().count(), 0);
    }

    #[test]
    fn test_crash_mid_set_is_recovered() {
        let t = heap_table(16, 16, 16);
        t.table.set(b"stable", b"kept").unwrap();

        // A writer dies after marking intent and tearing a slot, lock still held.
        let index = ProbeSeq::new(b"victim", 16)
            .find(|&i| t.table.slot(i).state() == SlotState::Empty)
            .unwrap();
        t.table.mark_intent(index);
        t.table.slot(index).simulate_torn_write(b"vic");
        t.table.header().count.fetch_add(1, Ordering::AcqRel);
        let dead = lock::tests::dead_pid();
        t.table.header().lock.store(dead, Ordering::Release);

        // A reader meeting the torn slot takes the lock over and repairs it
        // rather than returning half an entry.
        assert_eq!(t.table.get(b"victim"), Err(TableError::NotFound));
        assert_eq!(t.table.lock_holder(), None);

        let start = std::time::Instant::now();
        t.table.set(b"after", b"crash").unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));

        assert_eq!(t.table.recoveries(), 1);
        // The torn slot is settled; the new insert may have reclaimed it.
        assert_eq!(t.table.slot(index).seq() & 1, 0);
        assert_eq!(t.table.get(b"victim"), Err(TableError::NotFound));
        assert_eq!(t.table.header().intent.load(Ordering::Acquire), 0);
        assert_eq!(t.table.len(), 2);
        assert_eq!(t.table.get(b"stable").unwrap(), b"kept");
        assert_eq!(t.table.get(b"after").unwrap(), b"crash");
        assert_eq!(t.table.lock_holder(), None);
    }

    #[test]
    fn test_get_waits_out_stalled_update() {
        let t = heap_table(8, 8, 16);
        t.table.set(b"key", b"committed").unwrap();
        let index = ProbeSeq::new(b"key", 8).next().unwrap();

        // A live writer holds the lock and is descheduled mid-update.
        let (guard, _) = lock::acquire(&t.table.header().lock, Duration::from_millis(100)).unwrap();
        t.table.slot(index).simulate_torn_write(b"key");

        let table = &t.table;
        std::thread::scope(|scope| {
            let reader = scope.spawn(move || table.get(b"key"));
            let walker = scope.spawn(move || table.iter().count());
            std::thread::sleep(Duration::from_millis(50));

            table.slot(index).write_value(b"key", b"updated");
            drop(guard);

            assert_eq!(reader.join().unwrap().unwrap(), b"updated");
            assert_eq!(walker.join().unwrap(), 1);
        });
        assert_eq!(t.table.recoveries(), 0);
    }

    #[test]
    fn test_get_repairs_update_left_by_dead_writer() {
        let t = heap_table(8, 8, 16);
        t.table.set(b"key", b"committed").unwrap();
        t.table.set(b"other", b"kept").unwrap();
        let index = ProbeSeq::new(b"key", 8)
            .find(|&i| t.table.slot(i).key_eq(b"key"))
            .unwrap();

        t.table.mark_intent(index);
        t.table.slot(index).simulate_torn_write(b"key");
        t.table
            .header()
            .lock
            .store(lock::tests::dead_pid(), Ordering::Release);

        // The interrupted update removes the key; the reader never blocks
        // on the dead holder and never sees half a value.
        let start = std::time::Instant::now();
        assert_eq!(t.table.get(b"key"), Err(TableError::NotFound));
        assert!(start.elapsed() < Duration::from_millis(500));

        assert_eq!(t.table.recoveries(), 1);
        assert_eq!(t.table.lock_holder(), None);
        assert_eq!(t.table.len(), 1);
        assert_eq!(t.table.get(b"other").unwrap(), b"kept");
        assert_eq!(t.table.iter().count(), 1);
    }

    #[test]
    fn test_force_recover_breaks_live_lock() {
        let t = heap_table(8, 8, 8);
        t.table
            .header()
            .lock
            .store(std::process::id(), Ordering::Release);
        assert!(matches!(
            t.table.set(b"k", b"v"),
            Err(TableError::LockTimeout { .. })
        ));

        let report = t.table.force_recover();
        assert_eq!(report.torn_slots, 0);
        assert_eq!(t.table.lock_holder(), None);
        t.table.set(b"k", b"v").unwrap();
    }

    #[test]
    fn test_concurrent_disjoint_writers() {
        let t = heap_table(4096, 16, 16);
        let table = &t.table;
        std::thread::scope(|scope| {
            for worker in 0..4 {
                scope.spawn(move || {
                    for i in 0..500 {
                        let key = format!("w{}-{}", worker, i);
                        table.set(key.as_bytes(), b"mark").unwrap();
                    }
                });
            }
        });
        assert_eq!(table.len(), 2000);
        assert_eq!(table.iter().count(), 2000);
    }

    #[test]
    fn test_concurrent_same_key_single_winner() {
        let t = heap_table(64, 8, 8);
        let table = &t.table;
        std::thread::scope(|scope| {
            for worker in 0..4u8 {
                scope.spawn(move || {
                    for _ in 0..200 {
                        table.set(b"shared", &[worker; 8]).unwrap();
                    }
                });
            }
        });
        assert_eq!(table.len(), 1);
        let value = table.get(b"shared").unwrap();
        assert_eq!(value.len(), 8);
        assert!(value.iter().all(|&b| b == value[0]));
    }
}
