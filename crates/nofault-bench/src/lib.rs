//! Shared fixtures for the nofault benchmarks.

use nofault_membrane::{GuardedRegion, UntrustedAddr};

/// String lengths (terminator excluded) swept by the benchmarks.
pub const LENGTHS: &[usize] = &[0, 15, 255, 4095, 16 * 1024];

/// A NUL-terminated string of `len` bytes ending right before a guard page.
pub struct StringFixture {
    region: GuardedRegion,
    src: UntrustedAddr,
    len: usize,
}

impl StringFixture {
    pub fn new(len: usize) -> std::io::Result<Self> {
        let page = nofault_membrane::page_size();
        let region = GuardedRegion::new((len + 1).div_ceil(page).max(1))?;
        let mut bytes: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
        bytes.push(0);
        let src = region.place_at_end(&bytes);
        Ok(Self { region, src, len })
    }

    #[must_use]
    pub fn src(&self) -> UntrustedAddr {
        self.src
    }

    /// Address that always faults.
    #[must_use]
    pub fn unreadable(&self) -> UntrustedAddr {
        self.region.unreadable_addr()
    }

    /// Size of the string including its terminator.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len + 1
    }
}
