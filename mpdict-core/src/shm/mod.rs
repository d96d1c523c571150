// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory segments.
//!
//! POSIX shared memory objects hosting the table, and the manager that
//! creates, attaches to and destroys them by name.

mod region;
mod segment;

pub use region::SharedMemoryRegion;
pub use segment::Segment;
