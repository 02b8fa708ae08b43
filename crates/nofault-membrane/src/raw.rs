//! Raw bounded primitives over an [`UntrustedReader`].
//!
//! Each primitive walks the untrusted range one page-bounded chunk at a time,
//! so a string that ends just before an unmapped page is read without ever
//! touching that page. All of them take a `&NoFaultScope`: they cannot be
//! called outside an active scope.

use crate::addr::UntrustedAddr;
use crate::reader::{ReadFault, UntrustedReader};
use crate::scope::NoFaultScope;

/// Scratch size for length scans that have no destination buffer.
const SCAN_CHUNK: usize = 256;

/// Result of [`raw_copy_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawCopy {
    /// Bytes written before the terminator. Equals `dst.len()` when no
    /// terminator was found within the limit; otherwise `dst[n] == 0`.
    Written(usize),
    /// The source could not be read.
    Fault,
}

/// Result of [`raw_strnlen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLength {
    /// Offset of the first NUL.
    Found(usize),
    /// No NUL within the bound.
    NotFound,
    /// The source could not be read.
    Fault,
}

#[inline]
fn chunk_at(addr: UntrustedAddr, remaining: usize) -> usize {
    remaining.min(addr.page_remaining())
}

/// Copy a NUL-terminated string of at most `dst.len()` bytes from `src`.
///
/// Bytes after the terminator inside the last chunk may also be written;
/// they carry no meaning.
pub fn raw_copy_string<R: UntrustedReader + ?Sized>(
    reader: &R,
    scope: &NoFaultScope,
    dst: &mut [u8],
    src: UntrustedAddr,
) -> RawCopy {
    let limit = dst.len();
    let mut done = 0;
    while done < limit {
        let Some(addr) = src.checked_add(done) else {
            return RawCopy::Fault;
        };
        let chunk = chunk_at(addr, limit - done);
        let window = &mut dst[done..done + chunk];
        if reader.read(scope, window, addr).is_err() {
            return RawCopy::Fault;
        }
        if let Some(nul) = window.iter().position(|&b| b == 0) {
            return RawCopy::Written(done + nul);
        }
        done += chunk;
    }
    RawCopy::Written(limit)
}

/// Find the first NUL in at most `bound` bytes at `src`.
pub fn raw_strnlen<R: UntrustedReader + ?Sized>(
    reader: &R,
    scope: &NoFaultScope,
    src: UntrustedAddr,
    bound: usize,
) -> RawLength {
    let mut scratch = [0_u8; SCAN_CHUNK];
    let mut done = 0;
    while done < bound {
        let Some(addr) = src.checked_add(done) else {
            return RawLength::Fault;
        };
        let chunk = chunk_at(addr, bound - done).min(SCAN_CHUNK);
        let window = &mut scratch[..chunk];
        if reader.read(scope, window, addr).is_err() {
            return RawLength::Fault;
        }
        if let Some(nul) = window.iter().position(|&b| b == 0) {
            return RawLength::Found(done + nul);
        }
        done += chunk;
    }
    RawLength::NotFound
}

/// Copy exactly `dst.len()` bytes from `src`.
pub fn raw_copy<R: UntrustedReader + ?Sized>(
    reader: &R,
    scope: &NoFaultScope,
    dst: &mut [u8],
    src: UntrustedAddr,
) -> Result<(), ReadFault> {
    let len = dst.len();
    let mut done = 0;
    while done < len {
        let addr = src.checked_add(done).ok_or(ReadFault::Fault {
            addr: src,
            len,
            errno: libc::EFAULT,
        })?;
        let chunk = chunk_at(addr, len - done);
        reader.read(scope, &mut dst[done..done + chunk], addr)?;
        done += chunk;
    }
    Ok(())
}
