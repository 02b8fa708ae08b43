//! Untrusted address type and page geometry.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fallback when `sysconf(_SC_PAGESIZE)` is unavailable.
const DEFAULT_PAGE_SIZE: usize = 4096;

// 0 = unresolved. Resolution is idempotent so concurrent first callers may
// both query sysconf; no lock is taken.
static CACHED_PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// System page size in bytes.
#[must_use]
pub fn page_size() -> usize {
    let cached = CACHED_PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }

    // SAFETY: sysconf has no memory-safety preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let size = usize::try_from(raw)
        .ok()
        .filter(|s| s.is_power_of_two())
        .unwrap_or(DEFAULT_PAGE_SIZE);
    CACHED_PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// An address in memory we do not trust.
///
/// Holding one never implies the address is mapped. The only way to look at
/// the bytes behind it is through an [`UntrustedReader`](crate::UntrustedReader)
/// inside a [`NoFaultScope`](crate::NoFaultScope).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UntrustedAddr(usize);

impl UntrustedAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Wrap a raw pointer without asserting anything about it.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `self + offset`, or `None` on address-space wraparound.
    #[must_use]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Bytes from `self` to the end of its page.
    #[must_use]
    pub fn page_remaining(self) -> usize {
        let page = page_size();
        page - (self.0 & (page - 1))
    }
}

impl fmt::Debug for UntrustedAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UntrustedAddr({:#x})", self.0)
    }
}

impl fmt::LowerHex for UntrustedAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<usize> for UntrustedAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();
        assert!(size.is_power_of_two());
        assert_eq!(page_size(), size);
    }

    #[test]
    fn page_remaining_counts_to_boundary() {
        let page = page_size();
        assert_eq!(UntrustedAddr::new(page * 3).page_remaining(), page);
        assert_eq!(UntrustedAddr::new(page * 3 + 1).page_remaining(), page - 1);
        assert_eq!(UntrustedAddr::new(page * 4 - 1).page_remaining(), 1);
    }

    #[test]
    fn checked_add_detects_wraparound() {
        assert_eq!(
            UntrustedAddr::new(0x1000).checked_add(0x10),
            Some(UntrustedAddr::new(0x1010))
        );
        assert_eq!(UntrustedAddr::new(usize::MAX).checked_add(1), None);
    }

    #[test]
    fn debug_is_hex() {
        assert_eq!(
            format!("{:?}", UntrustedAddr::new(0xdead)),
            "UntrustedAddr(0xdead)"
        );
        assert!(UntrustedAddr::NULL.is_null());
    }
}
