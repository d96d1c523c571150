// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment manager: create, attach to and destroy named table segments.
//!
//! Creation is exclusive (`O_EXCL`), so exactly one process initializes a
//! segment. It writes the header and publishes it by setting `init_state`;
//! attachers wait for that flag before trusting any header field. A creator
//! that dies before publishing leaves a segment every attacher rejects with
//! `IncompatibleLayout`; reopening with `reset = true` replaces it.

use std::ptr::NonNull;
use std::time::{Duration, Instant};

use crate::config::{TableConfig, MAX_SEGMENT_SIZE};
use crate::error::SegmentError;
use crate::shm::SharedMemoryRegion;
use crate::table::layout::{Geometry, Header, HEADER_SIZE};
use crate::types::SegmentName;

/// How long an attacher waits for the creator to publish the header.
const INIT_WAIT: Duration = Duration::from_secs(2);

/// Attempts at the create-or-attach race before giving up.
const OPEN_ATTEMPTS: u32 = 3;

/// A mapped, validated table segment.
pub struct Segment {
    region: SharedMemoryRegion,
    geometry: Geometry,
}

impl Segment {
    /// Open `name`, creating it if absent.
    ///
    /// With `reset` the existing segment (if any) is unlinked first and a
    /// fresh, empty one is created. Processes still mapping the old segment
    /// keep using it, unaware of the new one.
    ///
    /// A geometry larger than [`MAX_SEGMENT_SIZE`], or one the shared memory
    /// filesystem cannot back, fails with `AllocationFailed`.
    pub fn open(name: &SegmentName, config: &TableConfig, reset: bool) -> Result<Self, SegmentError> {
        let geometry = Geometry::from_config(config);
        if geometry.total_size > MAX_SEGMENT_SIZE {
            return Err(SegmentError::AllocationFailed {
                name: name.to_string(),
                size: usize::try_from(geometry.total_size).unwrap_or(usize::MAX),
                reason: format!("segment size exceeds the {} byte limit", MAX_SEGMENT_SIZE),
            });
        }

        if reset {
            match SharedMemoryRegion::unlink(name) {
                Ok(()) => tracing::info!(name = %name, "Reset existing segment"),
                Err(SegmentError::SegmentNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        for _ in 0..OPEN_ATTEMPTS {
            if let Some(segment) = Self::create(name, geometry)? {
                return Ok(segment);
            }
            match Self::attach_geometry(name, geometry) {
                // Destroyed between our create and attach attempts.
                Err(SegmentError::SegmentNotFound { .. }) => continue,
                other => return other,
            }
        }

        Err(SegmentError::SegmentNotFound {
            name: name.to_string(),
        })
    }

    /// Attach to an existing segment without ever creating one.
    pub fn attach(name: &SegmentName, config: &TableConfig) -> Result<Self, SegmentError> {
        Self::attach_geometry(name, Geometry::from_config(config))
    }

    /// Remove `name` from the OS namespace.
    ///
    /// Unsafe to rely on while other processes are attached: they keep a
    /// working but orphaned mapping, and writes made through it are invisible
    /// to anyone who opens the name afterwards.
    pub fn destroy(name: &SegmentName) -> Result<(), SegmentError> {
        SharedMemoryRegion::unlink(name)?;
        tracing::info!(name = %name, "Destroyed segment");
        Ok(())
    }

    fn create(name: &SegmentName, geometry: Geometry) -> Result<Option<Self>, SegmentError> {
        let size = usize::try_from(geometry.total_size).map_err(|_| {
            SegmentError::AllocationFailed {
                name: name.to_string(),
                size: usize::MAX,
                reason: "segment size exceeds the address space".to_string(),
            }
        })?;

        let region = match SharedMemoryRegion::create(name, size)? {
            Some(region) => region,
            None => return Ok(None),
        };

        // SAFETY: the region was just created exclusively and is zero-filled;
        // nobody reads the header before init_state is published.
        unsafe { Header::init(region.as_ptr() as *mut Header, &geometry) };

        tracing::debug!(
            name = %name,
            capacity = geometry.capacity,
            slot_size = geometry.slot_size,
            size = size,
            "Initialized table segment"
        );

        Ok(Some(Self { region, geometry }))
    }

    fn attach_geometry(name: &SegmentName, geometry: Geometry) -> Result<Self, SegmentError> {
        let region = SharedMemoryRegion::open(name, HEADER_SIZE)?;
        // SAFETY: the region is at least HEADER_SIZE bytes
        let header = unsafe { &*(region.as_ptr() as *const Header) };

        let start = Instant::now();
        while !header.is_ready() {
            if start.elapsed() > INIT_WAIT {
                return Err(SegmentError::IncompatibleLayout {
                    name: name.to_string(),
                    reason: "segment was never fully initialized".to_string(),
                });
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        header
            .validate(&geometry, region.size())
            .map_err(|reason| SegmentError::IncompatibleLayout {
                name: name.to_string(),
                reason,
            })?;

        tracing::debug!(name = %name, capacity = geometry.capacity, "Attached to table segment");

        Ok(Self { region, geometry })
    }

    pub fn name(&self) -> &SegmentName {
        self.region.name()
    }

    pub fn size(&self) -> usize {
        self.region.size()
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Base address of this process's mapping.
    pub fn base(&self) -> NonNull<u8> {
        // SAFETY: a mapped region never has a null base
        unsafe { NonNull::new_unchecked(self.region.as_ptr()) }
    }
}
