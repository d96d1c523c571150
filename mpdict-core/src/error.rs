// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for mpdict.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.
//! Segment-level errors are fatal at open time; table errors are returned
//! per operation and never leave shared state corrupted.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the mpdict library.
#[derive(Debug, Error)]
pub enum MpDictError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Segment Errors - Fatal at open()
    // =========================================================================
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    // =========================================================================
    // Table Errors - Recoverable, per operation
    // =========================================================================
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors reject a configuration before any segment is touched.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Segment size out of bounds: {size} bytes (max: {max})")]
    SegmentTooLarge { size: u64, max: u64 },
}

/// Segment errors. Raised by open/attach/destroy and never leave a
/// partially initialized segment visible to other attachers.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Shared memory segment not found: {name}")]
    SegmentNotFound { name: String },

    #[error("Failed to allocate {size} bytes for segment {name}: {reason}")]
    AllocationFailed {
        name: String,
        size: usize,
        reason: String,
    },

    #[error("Permission denied on segment {name}")]
    PermissionDenied { name: String },

    #[error("Incompatible layout for segment {name}: {reason}")]
    IncompatibleLayout { name: String, reason: String },

    #[error("Invalid segment name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Failed to unlink segment {name}: {reason}")]
    UnlinkFailed { name: String, reason: String },
}

/// Per-operation table errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("Table is full: capacity {capacity} reached")]
    CapacityExceeded { capacity: u64 },

    #[error("Key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error("Value too long: {len} bytes (max {max})")]
    ValueTooLong { len: usize, max: usize },

    #[error("Key not found")]
    NotFound,

    #[error("Timed out after {waited_ms}ms waiting for mutation lock held by pid {holder}")]
    LockTimeout { holder: u32, waited_ms: u64 },

    #[error("Slot {slot} is corrupted: {reason}")]
    Corrupted { slot: u64, reason: String },
}

/// Result type alias using MpDictError.
pub type MpDictResult<T> = Result<T, MpDictError>;
