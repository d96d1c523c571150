// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-segment layout of the hash table.
//!
//! ```text
//! +-----------------+--------+--------+-----+------------+
//! | Header (128 B)  | slot 0 | slot 1 | ... | slot cap-1 |
//! +-----------------+--------+--------+-----+------------+
//!
//! slot = | SlotHeader (24 B) | key bytes [max_key] | value bytes [max_value] | pad to 8 |
//! ```
//!
//! Every reference inside the segment is a byte offset from the segment base;
//! `slot_offset(i) = HEADER_SIZE + i * slot_size`. Nothing stored in the
//! segment is a native pointer.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::TableConfig;

/// Identifies an mpdict segment, layout version 1.
pub const MAGIC: [u8; 8] = *b"MPDICT\x00\x01";

/// Current layout version.
pub const LAYOUT_VERSION: u32 = 1;

/// Fixed size of the segment header in bytes.
pub const HEADER_SIZE: usize = 128;

/// Fixed size of the per-slot header in bytes.
pub const SLOT_HEADER_SIZE: usize = 24;

/// Alignment of every slot.
const SLOT_ALIGNMENT: usize = 8;

/// Header `init_state` once every field is written.
pub const INIT_READY: u32 = 1;

/// Bytes occupied by a slot with the given key/value bounds.
pub const fn slot_size(max_key_bytes: usize, max_value_bytes: usize) -> usize {
    align_up(SLOT_HEADER_SIZE + max_key_bytes + max_value_bytes, SLOT_ALIGNMENT)
}

const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Occupancy of a slot.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty = 0,
    Occupied = 1,
    Tombstone = 2,
}

impl SlotState {
    /// Decode a stored state. Unknown values read as `Tombstone` so that
    /// probing continues past them and inserts may reclaim them.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Empty,
            1 => Self::Occupied,
            _ => Self::Tombstone,
        }
    }
}

/// Table geometry: fixed at creation, identical for every attacher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub capacity: u64,
    pub max_key_bytes: u32,
    pub max_value_bytes: u32,
    pub slot_size: u64,
    pub total_size: u64,
}

impl Geometry {
    pub fn from_config(config: &TableConfig) -> Self {
        Self {
            capacity: config.capacity(),
            max_key_bytes: config.max_key_bytes() as u32,
            max_value_bytes: config.max_value_bytes() as u32,
            slot_size: config.slot_size() as u64,
            total_size: config.segment_size(),
        }
    }

    /// Byte offset of slot `index` from the segment base.
    #[inline]
    pub fn slot_offset(&self, index: u64) -> usize {
        HEADER_SIZE + (index * self.slot_size) as usize
    }
}

/// The header lives at offset 0 of every mpdict segment.
///
/// Geometry fields are written once by the creator before `init_state`
/// is published and are read-only afterwards. The atomics are the shared
/// mutable state of the table.
#[repr(C)]
pub struct Header {
    /// "MPDICT\0\x01".
    pub magic: [u8; 8],
    /// Layout version (currently 1).
    pub version: u32,
    /// Always 128.
    pub header_size: u32,
    /// Number of slots.
    pub capacity: u64,
    pub max_key_bytes: u32,
    pub max_value_bytes: u32,
    pub slot_size: u64,
    /// Total segment size in bytes.
    pub total_size: u64,
    /// 0 while the creator is writing the header, `INIT_READY` afterwards.
    pub init_state: AtomicU32,
    /// PID of the mutation lock holder; 0 when free.
    pub lock: AtomicU32,
    /// Live (occupied) entries.
    pub count: AtomicU64,
    /// Slot index + 1 of the mutation in flight; 0 when none.
    pub intent: AtomicU64,
    /// Number of times the lock was taken over and the table repaired.
    pub recoveries: AtomicU64,
    /// Tombstoned slots.
    pub tombstones: AtomicU64,
    _reserved: [u8; 40],
}

const _: () = assert!(std::mem::size_of::<Header>() == HEADER_SIZE);

impl Header {
    /// Write the geometry into a zeroed header, then publish it.
    ///
    /// # Safety
    ///
    /// `this` must point to zeroed memory that no other process reads
    /// non-atomically before `init_state` becomes `INIT_READY`.
    pub unsafe fn init(this: *mut Header, geometry: &Geometry) {
        std::ptr::addr_of_mut!((*this).magic).write(MAGIC);
        std::ptr::addr_of_mut!((*this).version).write(LAYOUT_VERSION);
        std::ptr::addr_of_mut!((*this).header_size).write(HEADER_SIZE as u32);
        std::ptr::addr_of_mut!((*this).capacity).write(geometry.capacity);
        std::ptr::addr_of_mut!((*this).max_key_bytes).write(geometry.max_key_bytes);
        std::ptr::addr_of_mut!((*this).max_value_bytes).write(geometry.max_value_bytes);
        std::ptr::addr_of_mut!((*this).slot_size).write(geometry.slot_size);
        std::ptr::addr_of_mut!((*this).total_size).write(geometry.total_size);

        let header = &*this;
        header.lock.store(0, Ordering::Relaxed);
        header.count.store(0, Ordering::Relaxed);
        header.intent.store(0, Ordering::Relaxed);
        header.recoveries.store(0, Ordering::Relaxed);
        header.tombstones.store(0, Ordering::Relaxed);
        header.init_state.store(INIT_READY, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.init_state.load(Ordering::Acquire) == INIT_READY
    }

    /// Check that a published header matches the geometry an attacher expects.
    pub fn validate(&self, expected: &Geometry, mapped_size: usize) -> Result<(), String> {
        if self.magic != MAGIC {
            return Err("bad magic: not an mpdict segment".to_string());
        }
        if self.version != LAYOUT_VERSION {
            return Err(format!(
                "layout version {} (expected {})",
                self.version, LAYOUT_VERSION
            ));
        }
        if self.header_size != HEADER_SIZE as u32 {
            return Err(format!("unexpected header size {}", self.header_size));
        }
        if self.capacity != expected.capacity {
            return Err(format!(
                "capacity {} (requested {})",
                self.capacity, expected.capacity
            ));
        }
        if self.max_key_bytes != expected.max_key_bytes
            || self.max_value_bytes != expected.max_value_bytes
        {
            return Err(format!(
                "key/value bounds {}/{} (requested {}/{})",
                self.max_key_bytes,
                self.max_value_bytes,
                expected.max_key_bytes,
                expected.max_value_bytes
            ));
        }
        if self.slot_size != expected.slot_size {
            return Err(format!(
                "slot size {} (requested {})",
                self.slot_size, expected.slot_size
            ));
        }
        if self.total_size != expected.total_size || mapped_size as u64 != self.total_size {
            return Err(format!(
                "segment size {} / mapped {} (requested {})",
                self.total_size, mapped_size, expected.total_size
            ));
        }
        Ok(())
    }
}

/// Per-slot header. Key and value bytes follow it inline.
///
/// `seq` is a sequence counter: odd while a writer is mid-update, even
/// otherwise. Length and checksum fields are atomics so that lock-free
/// readers never observe a torn integer.
#[repr(C)]
pub struct SlotHeader {
    pub seq: AtomicU64,
    pub state: AtomicU32,
    pub key_len: AtomicU32,
    pub value_len: AtomicU32,
    /// CRC32 over key bytes followed by value bytes.
    pub checksum: AtomicU32,
}

const _: () = assert!(std::mem::size_of::<SlotHeader>() == SLOT_HEADER_SIZE);
