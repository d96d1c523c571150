// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Access to a single slot: seqlock-protected reads and locked writes.
//!
//! Writers hold the table's mutation lock. They make `seq` odd, write the
//! slot, then make `seq` even with release ordering. Readers take no lock:
//! they load an even `seq`, copy what they need, and accept the copy only if
//! `seq` is unchanged afterwards. Torn copies are discarded, never returned.

use std::sync::atomic::{fence, Ordering};

use super::layout::{Geometry, SlotHeader, SlotState, SLOT_HEADER_SIZE};

/// Read attempts on a slot before it is reported busy.
const READ_RETRIES: u32 = 128;

/// CRC32 over key bytes followed by value bytes.
pub fn entry_checksum(key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// A consistent copy of an occupied slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCopy {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub checksum: u32,
}

impl EntryCopy {
    pub fn is_intact(&self) -> bool {
        entry_checksum(&self.key, &self.value) == self.checksum
    }
}

/// Borrowed view of slot `index` inside a mapped segment.
pub struct Slot<'a> {
    header: &'a SlotHeader,
    key_ptr: *mut u8,
    value_ptr: *mut u8,
    max_key: usize,
    max_value: usize,
}

impl<'a> Slot<'a> {
    /// # Safety
    ///
    /// `base` must be the start of a mapped segment described by `geometry`
    /// and `index` must be below `geometry.capacity`.
    pub unsafe fn at(base: *mut u8, geometry: &Geometry, index: u64) -> Self {
        let slot_ptr = base.add(geometry.slot_offset(index));
        let key_ptr = slot_ptr.add(SLOT_HEADER_SIZE);
        Self {
            header: &*(slot_ptr as *const SlotHeader),
            key_ptr,
            value_ptr: key_ptr.add(geometry.max_key_bytes as usize),
            max_key: geometry.max_key_bytes as usize,
            max_value: geometry.max_value_bytes as usize,
        }
    }

    // -- Lock-free reads ----------------------------------------------------

    /// Run `f` against a stable version of the slot.
    ///
    /// Returns `None` if the slot stayed mid-write for every attempt.
    pub fn read_consistent<T>(&self, mut f: impl FnMut(&Self) -> T) -> Option<T> {
        for _ in 0..READ_RETRIES {
            let before = self.header.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let out = f(self);
            fence(Ordering::Acquire);
            if self.header.seq.load(Ordering::Relaxed) == before {
                return Some(out);
            }
        }
        None
    }

    pub fn state(&self) -> SlotState {
        SlotState::from_raw(self.header.state.load(Ordering::Relaxed))
    }

    pub fn seq(&self) -> u64 {
        self.header.seq.load(Ordering::Acquire)
    }

    fn key_len(&self) -> usize {
        (self.header.key_len.load(Ordering::Relaxed) as usize).min(self.max_key)
    }

    fn value_len(&self) -> usize {
        (self.header.value_len.load(Ordering::Relaxed) as usize).min(self.max_value)
    }

    /// Compare the stored key with `key`. Inside `read_consistent` a torn
    /// comparison is discarded by the sequence check.
    pub fn key_eq(&self, key: &[u8]) -> bool {
        let len = self.key_len();
        if len != key.len() {
            return false;
        }
        // SAFETY: len is clamped to max_key, so the range lies inside the slot
        let stored = unsafe { std::slice::from_raw_parts(self.key_ptr as *const u8, len) };
        stored == key
    }

    pub fn copy_key(&self) -> Vec<u8> {
        Self::copy_bytes(self.key_ptr, self.key_len())
    }

    pub fn copy_value(&self) -> Vec<u8> {
        Self::copy_bytes(self.value_ptr, self.value_len())
    }

    pub fn checksum(&self) -> u32 {
        self.header.checksum.load(Ordering::Relaxed)
    }

    /// Copy key, value and checksum of an occupied slot.
    pub fn copy_entry(&self) -> EntryCopy {
        EntryCopy {
            key: self.copy_key(),
            value: self.copy_value(),
            checksum: self.checksum(),
        }
    }

    fn copy_bytes(src: *const u8, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        // SAFETY: len is clamped to the slot's bound for this field
        unsafe { std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len) };
        out
    }

    // -- Writes (mutation lock held) ----------------------------------------

    fn begin_write(&self) -> u64 {
        let seq = self.header.seq.load(Ordering::Relaxed);
        self.header.seq.store(seq | 1, Ordering::Relaxed);
        fence(Ordering::Release);
        seq | 1
    }

    fn end_write(&self, odd: u64) {
        self.header.seq.store(odd + 1, Ordering::Release);
    }

    /// Store an entry and mark the slot occupied.
    ///
    /// Callers must hold the mutation lock and have checked both bounds.
    pub fn write_entry(&self, key: &[u8], value: &[u8]) {
        debug_assert!(key.len() <= self.max_key && value.len() <= self.max_value);
        let odd = self.begin_write();
        // SAFETY: bounds were checked by the caller; slot memory is writable
        unsafe {
            std::ptr::copy_nonoverlapping(key.as_ptr(), self.key_ptr, key.len());
            std::ptr::copy_nonoverlapping(value.as_ptr(), self.value_ptr, value.len());
        }
        self.header
            .key_len
            .store(key.len() as u32, Ordering::Relaxed);
        self.header
            .value_len
            .store(value.len() as u32, Ordering::Relaxed);
        self.header
            .checksum
            .store(entry_checksum(key, value), Ordering::Relaxed);
        self.header
            .state
            .store(SlotState::Occupied as u32, Ordering::Relaxed);
        self.end_write(odd);
    }

    /// Replace only the value of an occupied slot.
    pub fn write_value(&self, key: &[u8], value: &[u8]) {
        debug_assert!(value.len() <= self.max_value);
        let odd = self.begin_write();
        // SAFETY: bounds were checked by the caller; slot memory is writable
        unsafe {
            std::ptr::copy_nonoverlapping(value.as_ptr(), self.value_ptr, value.len());
        }
        self.header
            .value_len
            .store(value.len() as u32, Ordering::Relaxed);
        self.header
            .checksum
            .store(entry_checksum(key, value), Ordering::Relaxed);
        self.end_write(odd);
    }

    /// Mark the slot tombstoned and forget its contents.
    pub fn write_tombstone(&self) {
        let odd = self.begin_write();
        self.clear_fields();
        self.end_write(odd);
    }

    /// Repair a slot left mid-write by a crashed writer.
    ///
    /// Returns true if the slot was torn and is now a tombstone.
    pub fn repair_torn(&self) -> bool {
        let seq = self.header.seq.load(Ordering::Acquire);
        if seq & 1 == 0 {
            return false;
        }
        self.clear_fields();
        self.end_write(seq);
        true
    }

    fn clear_fields(&self) {
        self.header.key_len.store(0, Ordering::Relaxed);
        self.header.value_len.store(0, Ordering::Relaxed);
        self.header.checksum.store(0, Ordering::Relaxed);
        self.header
            .state
            .store(SlotState::Tombstone as u32, Ordering::Relaxed);
    }

    /// Leave the slot mid-write, as a writer killed at this point would.
    #[cfg(test)]
    pub fn simulate_torn_write(&self, partial_key: &[u8]) {
        self.begin_write();
        unsafe {
            std::ptr::copy_nonoverlapping(partial_key.as_ptr(), self.key_ptr, partial_key.len());
        }
        self.header
            .key_len
            .store(partial_key.len() as u32, Ordering::Relaxed);
        self.header
            .state
            .store(SlotState::Occupied as u32, Ordering::Relaxed);
    }
}
