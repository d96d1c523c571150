// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Dictionary backends.
//!
//! The benchmark driver and its workers talk to a `Dictionary`, so the same
//! workload runs against the shared-memory table or against a process-local
//! DashMap used as a baseline.

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;

use crate::config::TableConfig;
use crate::error::{MpDictResult, TableError};
use crate::map::SharedMap;
use crate::types::SegmentName;

/// Minimal dictionary surface shared by every backend.
pub trait Dictionary: Send + Sync {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), TableError>;

    /// `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TableError>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys(&self) -> Vec<Vec<u8>>;

    fn backend_name(&self) -> &'static str;
}

impl Dictionary for SharedMap {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        SharedMap::set(self, key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TableError> {
        match SharedMap::get(self, key) {
            Ok(value) => Ok(Some(value)),
            Err(TableError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn len(&self) -> u64 {
        SharedMap::len(self)
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        SharedMap::keys(self).collect()
    }

    fn backend_name(&self) -> &'static str {
        "shm"
    }
}

/// Process-local map. Only visible to the process that created it.
#[derive(Debug, Default)]
pub struct LocalMap {
    entries: DashMap<Vec<u8>, Vec<u8>>,
}

impl LocalMap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dictionary for LocalMap {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TableError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// Which backend a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Shm,
    Local,
}

impl Backend {
    /// Open (or create) a dictionary of this kind.
    ///
    /// `reset` only applies to the shared backend; a local map always starts
    /// empty.
    pub fn open(
        self,
        name: &SegmentName,
        config: &TableConfig,
        reset: bool,
    ) -> MpDictResult<Box<dyn Dictionary>> {
        match self {
            Backend::Shm => Ok(Box::new(SharedMap::open(name, config, reset)?)),
            Backend::Local => Ok(Box::new(LocalMap::new())),
        }
    }

    pub fn is_shared(self) -> bool {
        matches!(self, Backend::Shm)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Shm => write!(f, "shm"),
            Backend::Local => write!(f, "local"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shm" | "shared" => Ok(Backend::Shm),
            "local" => Ok(Backend::Local),
            other => Err(format!("unknown backend '{}' (expected shm or local)", other)),
        }
    }
}
