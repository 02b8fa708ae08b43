//! Bounded string length at an untrusted address.

use nofault_membrane::{
    NoFaultScope, RawLength, SystemReader, UntrustedAddr, UntrustedReader, global_stats,
    raw_strnlen,
};

use crate::outcome::NoFaultError;

/// Result of a bounded length scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthOutcome {
    /// The bound was not positive; nothing was read.
    NoWork,
    /// Size of the string including its terminator.
    Terminated(usize),
    /// No terminator within the bound (holds the bound).
    ExceedsLimit(usize),
}

impl LengthOutcome {
    /// `0` for no work, the size with terminator when found, and `count + 1`
    /// when the string is longer than `count`.
    #[must_use]
    pub const fn legacy(self) -> i64 {
        match self {
            Self::NoWork => 0,
            Self::Terminated(n) => n as i64,
            Self::ExceedsLimit(count) => count as i64 + 1,
        }
    }
}

/// Measure the C string at `src`, reading at most `count` bytes, using the
/// configured system reader.
pub fn strnlen_nofault(src: UntrustedAddr, count: isize) -> Result<LengthOutcome, NoFaultError> {
    strnlen_nofault_with(&SystemReader, src, count)
}

/// Measure the C string at `src` through `reader`, reading at most `count`
/// bytes.
pub fn strnlen_nofault_with<R: UntrustedReader + ?Sized>(
    reader: &R,
    src: UntrustedAddr,
    count: isize,
) -> Result<LengthOutcome, NoFaultError> {
    let stats = global_stats();
    if count <= 0 {
        stats.record_noop();
        return Ok(LengthOutcome::NoWork);
    }
    let count = count.unsigned_abs();
    let raw = {
        let scope = NoFaultScope::enter();
        raw_strnlen(reader, &scope, src, count)
    };
    // A scan hands no bytes to the caller.
    match raw {
        RawLength::Found(len) => {
            stats.record_copied(0);
            Ok(LengthOutcome::Terminated(len + 1))
        }
        RawLength::NotFound => {
            stats.record_truncated(0);
            Ok(LengthOutcome::ExceedsLimit(count))
        }
        RawLength::Fault => {
            stats.record_fault();
            Err(NoFaultError::UnreadableSource { addr: src })
        }
    }
}
