// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SharedMemoryRegion - POSIX shared memory wrapper.
//!
//! Provides safe abstraction over `shm_open` and `mmap`.
//! A region is jointly owned by every process that maps it: dropping a
//! region only unmaps this process's view. Removal from the OS namespace
//! happens through [`SharedMemoryRegion::unlink`] alone.

use std::ffi::CString;
use std::ptr::NonNull;
use std::time::{Duration, Instant};

use crate::error::SegmentError;
use crate::types::SegmentName;

/// How long an attacher waits for a concurrent creator to size the segment.
const SIZE_WAIT: Duration = Duration::from_secs(2);

/// Represents a mapped shared memory region.
///
/// This struct owns the mapping (not the segment) and unmaps it on drop.
pub struct SharedMemoryRegion {
    /// Name of the shared memory object.
    name: SegmentName,
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapped region in bytes.
    size: usize,
    /// File descriptor for the shared memory object.
    fd: i32,
}

// SAFETY: SharedMemoryRegion owns its mapping; the pointer stays valid until drop.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: Concurrent access to the mapped bytes is coordinated by the table's
// atomics and mutation lock, never by the region itself.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Create a new shared memory object of `size` bytes and map it.
    ///
    /// Returns `Ok(None)` when an object with this name already exists.
    /// The mapped bytes are zero-filled by the kernel.
    ///
    /// # Errors
    /// Returns SegmentError if creation, sizing or mapping fails. A failed
    /// creation unlinks the half-made object so no other process sees it.
    pub fn create(name: &SegmentName, size: usize) -> Result<Option<Self>, SegmentError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            )
        };

        if fd < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::EEXIST) {
                return Ok(None);
            }
            return Err(Self::classify(name, size, errno));
        }

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(SegmentError::AllocationFailed {
                name: name.to_string(),
                size,
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        // ftruncate only sets a sparse size on tmpfs; reserve the pages now so
        // an oversized segment fails here instead of faulting on first write.
        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
        if result != 0 {
            let errno = std::io::Error::from_raw_os_error(result);
            unsafe { libc::close(fd) };
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(SegmentError::AllocationFailed {
                name: name.to_string(),
                size,
                reason: format!("posix_fallocate failed: {}", errno),
            });
        }

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Some(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
        }))
    }

    /// Open and map an existing shared memory object.
    ///
    /// The mapping covers the whole object. If a concurrent creator has not
    /// sized it yet, waits until it is at least `min_size` bytes.
    pub fn open(name: &SegmentName, min_size: usize) -> Result<Self, SegmentError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };

        if fd < 0 {
            return Err(Self::classify(
                name,
                min_size,
                std::io::Error::last_os_error(),
            ));
        }

        let size = match Self::wait_for_size(fd, min_size) {
            Ok(size) => size,
            Err(reason) => {
                unsafe { libc::close(fd) };
                return Err(SegmentError::IncompatibleLayout {
                    name: name.to_string(),
                    reason,
                });
            }
        };

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Opened shared memory region");

        Ok(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
        })
    }

    /// Remove the named object from the OS namespace.
    ///
    /// Processes that still map it keep a usable but orphaned mapping until
    /// they drop it; a later `open` of the same name will not see it.
    pub fn unlink(name: &SegmentName) -> Result<(), SegmentError> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let result = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            return Err(match errno.raw_os_error() {
                Some(libc::ENOENT) => SegmentError::SegmentNotFound {
                    name: name.to_string(),
                },
                Some(libc::EACCES) | Some(libc::EPERM) => SegmentError::PermissionDenied {
                    name: name.to_string(),
                },
                _ => SegmentError::UnlinkFailed {
                    name: name.to_string(),
                    reason: errno.to_string(),
                },
            });
        }

        tracing::debug!(name = %name, "Unlinked shared memory region");
        Ok(())
    }

    /// Get the name of this shared memory region.
    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    /// Get the size of this shared memory region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a raw pointer to the shared memory.
    ///
    /// Callers must synchronize access to the memory behind it.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn c_name(name: &SegmentName) -> Result<CString, SegmentError> {
        CString::new(name.os_name()).map_err(|e| SegmentError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn map(fd: i32, size: usize) -> Result<NonNull<u8>, SegmentError> {
        // SAFETY: fd is valid, size is non-zero and matches the object size
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(SegmentError::MapFailed {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        NonNull::new(ptr as *mut u8).ok_or_else(|| SegmentError::MapFailed {
            reason: "mmap returned null".to_string(),
        })
    }

    fn object_size(fd: i32) -> std::io::Result<usize> {
        // SAFETY: stat is plain-old-data and fully written by fstat on success
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::fstat(fd, &mut stat) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(stat.st_size as usize)
    }

    fn wait_for_size(fd: i32, min_size: usize) -> Result<usize, String> {
        let start = Instant::now();
        loop {
            let size = Self::object_size(fd).map_err(|e| format!("fstat failed: {}", e))?;
            if size >= min_size && size > 0 {
                return Ok(size);
            }
            if start.elapsed() > SIZE_WAIT {
                return Err(format!(
                    "segment is {} bytes, smaller than the {} byte minimum",
                    size, min_size
                ));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn classify(name: &SegmentName, size: usize, errno: std::io::Error) -> SegmentError {
        match errno.raw_os_error() {
            Some(libc::ENOENT) => SegmentError::SegmentNotFound {
                name: name.to_string(),
            },
            Some(libc::EACCES) | Some(libc::EPERM) => SegmentError::PermissionDenied {
                name: name.to_string(),
            },
            Some(libc::ENAMETOOLONG) | Some(libc::EINVAL) => SegmentError::InvalidName {
                name: name.to_string(),
                reason: errno.to_string(),
            },
            _ => SegmentError::AllocationFailed {
                name: name.to_string(),
                size,
                reason: format!("shm_open failed: {}", errno),
            },
        }
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size were set when the region was mapped
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if result < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }

        // SAFETY: fd was opened when the region was created or opened
        unsafe { libc::close(self.fd) };
        tracing::debug!(name = %self.name, "Unmapped shared memory region");
    }
}
