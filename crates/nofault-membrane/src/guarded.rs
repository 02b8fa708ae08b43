//! Readable pages followed by a `PROT_NONE` guard page.
//!
//! Used to place a string flush against memory that faults, so a copy that
//! runs one byte too far is observable as a fault instead of silently reading
//! neighbouring heap.

use std::ffi::c_void;
use std::io;

use crate::addr::{UntrustedAddr, page_size};

/// An anonymous mapping of `readable_pages` read/write pages and one
/// inaccessible page after them. Unmapped on drop.
#[derive(Debug)]
pub struct GuardedRegion {
    base: *mut u8,
    readable_len: usize,
    total_len: usize,
}

impl GuardedRegion {
    /// Map the region. `readable_pages` may be zero (guard page only).
    pub fn new(readable_pages: usize) -> io::Result<Self> {
        let page = page_size();
        let readable_len = readable_pages
            .checked_mul(page)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EOVERFLOW))?;
        let total_len = readable_len
            .checked_add(page)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EOVERFLOW))?;

        // SAFETY: anonymous private mapping with no address hint.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let region = Self {
            base: base.cast::<u8>(),
            readable_len,
            total_len,
        };

        // SAFETY: the guard page lies inside the mapping created above.
        let rc = unsafe {
            libc::mprotect(
                region.base.add(readable_len).cast::<c_void>(),
                page,
                libc::PROT_NONE,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(region)
    }

    /// Bytes available before the guard page.
    #[must_use]
    pub fn readable_len(&self) -> usize {
        self.readable_len
    }

    /// First byte of the guard page.
    #[must_use]
    pub fn unreadable_addr(&self) -> UntrustedAddr {
        UntrustedAddr::new(self.base as usize + self.readable_len)
    }

    /// Write `bytes` so that their last byte sits just before the guard page,
    /// returning the address of the first byte.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than the readable area.
    pub fn place_at_end(&self, bytes: &[u8]) -> UntrustedAddr {
        assert!(
            bytes.len() <= self.readable_len,
            "{} bytes do not fit in a {}-byte guarded region",
            bytes.len(),
            self.readable_len
        );
        let offset = self.readable_len - bytes.len();
        // SAFETY: [offset, readable_len) is inside the read/write part of our
        // own mapping; no Rust reference aliases it.
        unsafe {
            let dst = self.base.add(offset);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            UntrustedAddr::from_ptr(dst)
        }
    }
}

impl Drop for GuardedRegion {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly the range mapped in `new`.
        unsafe {
            libc::munmap(self.base.cast::<c_void>(), self.total_len);
        }
    }
}
