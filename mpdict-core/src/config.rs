// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Table configuration and YAML loading with strict validation.
//!
//! Capacity is an entry count. The byte footprint of a segment is derived
//! from it: `HEADER_SIZE + capacity * slot_size`, where the slot size is fixed
//! by the key and value bounds. Use [`TableConfig::capacity_for_budget`] to
//! turn a byte budget into an entry count.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, MpDictError, MpDictResult};
use crate::table::layout::{self, HEADER_SIZE};
use crate::types::{Capacity, SegmentName};

/// Largest key bound accepted.
pub const MAX_KEY_BYTES: usize = 4096;
/// Largest value bound accepted (1 MB).
pub const MAX_VALUE_BYTES: usize = 1024 * 1024;
/// Largest segment a configuration may request (64 GB).
pub const MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024 * 1024;
/// Longest lock wait a configuration may request (10 minutes).
const MAX_LOCK_TIMEOUT_MS: u64 = 600_000;

fn default_key_bytes() -> usize {
    64
}

fn default_value_bytes() -> usize {
    64
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

/// Raw table configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawTableConfig {
    name: String,
    capacity: u64,
    #[serde(default = "default_key_bytes")]
    max_key_bytes: usize,
    #[serde(default = "default_value_bytes")]
    max_value_bytes: usize,
    #[serde(default = "default_lock_timeout_ms")]
    lock_timeout_ms: u64,
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    table: RawTableConfig,
}

/// Validated table geometry and locking parameters.
///
/// Every process attaching to the same segment must use the same capacity
/// and key/value bounds; the lock timeout is process-local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    capacity: Capacity,
    max_key_bytes: usize,
    max_value_bytes: usize,
    lock_timeout: Duration,
}

impl TableConfig {
    /// Configuration with default key/value bounds (64 bytes each) and a 5s lock timeout.
    pub fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            max_key_bytes: default_key_bytes(),
            max_value_bytes: default_value_bytes(),
            lock_timeout: Duration::from_millis(default_lock_timeout_ms()),
        }
    }

    /// Set the largest key accepted by `set`.
    pub fn with_max_key_bytes(mut self, bytes: usize) -> Result<Self, HardValidationError> {
        if bytes == 0 || bytes > MAX_KEY_BYTES {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_key_bytes",
                value: bytes.to_string(),
                reason: format!("Must be between 1 and {}", MAX_KEY_BYTES),
            });
        }
        self.max_key_bytes = bytes;
        self.check_segment_size()?;
        Ok(self)
    }

    /// Set the largest value accepted by `set`.
    pub fn with_max_value_bytes(mut self, bytes: usize) -> Result<Self, HardValidationError> {
        if bytes == 0 || bytes > MAX_VALUE_BYTES {
            return Err(HardValidationError::InvalidFieldValue {
                field: "max_value_bytes",
                value: bytes.to_string(),
                reason: format!("Must be between 1 and {}", MAX_VALUE_BYTES),
            });
        }
        self.max_value_bytes = bytes;
        self.check_segment_size()?;
        Ok(self)
    }

    /// Set how long a mutation may wait for a live lock holder.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Result<Self, HardValidationError> {
        let ms = timeout.as_millis() as u64;
        if ms == 0 || ms > MAX_LOCK_TIMEOUT_MS {
            return Err(HardValidationError::InvalidFieldValue {
                field: "lock_timeout_ms",
                value: ms.to_string(),
                reason: format!("Must be between 1 and {}ms", MAX_LOCK_TIMEOUT_MS),
            });
        }
        self.lock_timeout = timeout;
        Ok(self)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.value()
    }

    pub fn max_key_bytes(&self) -> usize {
        self.max_key_bytes
    }

    pub fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Bytes occupied by one slot.
    pub fn slot_size(&self) -> usize {
        layout::slot_size(self.max_key_bytes, self.max_value_bytes)
    }

    /// Total bytes of the shared segment this configuration describes.
    pub fn segment_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.capacity.value() * self.slot_size() as u64
    }

    /// Number of entries that fit in `budget_bytes` with the given bounds.
    ///
    /// Returns 0 when the budget does not even cover the header and one slot.
    pub fn capacity_for_budget(budget_bytes: u64, max_key_bytes: usize, max_value_bytes: usize) -> u64 {
        let slot = layout::slot_size(max_key_bytes, max_value_bytes) as u64;
        budget_bytes.saturating_sub(HEADER_SIZE as u64) / slot
    }

    fn check_segment_size(&self) -> Result<(), HardValidationError> {
        let size = self.segment_size();
        if size > MAX_SEGMENT_SIZE {
            return Err(HardValidationError::SegmentTooLarge {
                size,
                max: MAX_SEGMENT_SIZE,
            });
        }
        Ok(())
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: SegmentName,
    pub table: TableConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> MpDictResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MpDictError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MpDictError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> MpDictResult<Config> {
        let raw: RawConfig = serde_yaml::from_str(content).map_err(|e| MpDictError::ConfigParse {
            message: format!("YAML parse error: {}", e),
        })?;

        Ok(Self::validate(raw.table)?)
    }

    fn validate(raw: RawTableConfig) -> Result<Config, HardValidationError> {
        let name = SegmentName::new(raw.name)?;
        let table = TableConfig::new(Capacity::new(raw.capacity)?)
            .with_max_key_bytes(raw.max_key_bytes)?
            .with_max_value_bytes(raw.max_value_bytes)?
            .with_lock_timeout(Duration::from_millis(raw.lock_timeout_ms))?;

        Ok(Config { name, table })
    }
}
