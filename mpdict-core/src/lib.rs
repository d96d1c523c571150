// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! mpdict Core Library
//!
//! A dictionary shared by independent processes on one host, with no broker.
//! Entries live in a fixed-capacity open-addressing hash table inside a named
//! POSIX shared memory segment. Writers serialize on a process-shared lock
//! that survives the death of its holder; readers take no lock.

pub mod backend;
pub mod config;
pub mod error;
pub mod map;
pub mod shm;
pub mod stats;
pub mod table;
pub mod types;

// Re-export commonly used types
pub use backend::{Backend, Dictionary, LocalMap};
pub use config::{Config, ConfigLoader, TableConfig};
pub use error::{HardValidationError, MpDictError, MpDictResult, SegmentError, TableError};
pub use map::SharedMap;
pub use stats::TableStats;
pub use table::RepairReport;
pub use types::{Capacity, SegmentName};
