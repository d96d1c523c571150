// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Key hashing and the linear probe sequence.
//!
//! The hash must be identical in every process attached to a segment, so the
//! randomized std hasher is not usable here.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the key bytes.
#[inline]
pub fn fnv1a(key: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &b in key {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Table hash: FNV-1a with the high half folded into the low half.
///
/// The low bits of plain FNV-1a depend only on the low bits of each input
/// byte, which clusters badly under power-of-two capacities.
#[inline]
pub fn hash_key(key: &[u8]) -> u64 {
    let h = fnv1a(key);
    h ^ (h >> 32)
}

/// Slot indices visited for a key: linear probing with wraparound,
/// starting at `hash % capacity`, at most `capacity` steps.
#[derive(Debug, Clone)]
pub struct ProbeSeq {
    next: u64,
    capacity: u64,
    remaining: u64,
}

impl ProbeSeq {
    pub fn new(key: &[u8], capacity: u64) -> Self {
        Self {
            next: hash_key(key) % capacity,
            capacity,
            remaining: capacity,
        }
    }
}

impl Iterator for ProbeSeq {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<u64> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.next;
        self.next += 1;
        if self.next == self.capacity {
            self.next = 0;
        }
        self.remaining -= 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}
