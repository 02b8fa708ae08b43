//! Tagged outcomes and their single-integer projection.
//!
//! Internally every operation returns `Result<_, NoFaultError>` with an
//! explicit tag for each success shape. The signed-integer encoding used by
//! C callers is produced only by [`legacy_code`] and the `legacy` methods.

use thiserror::Error;

use nofault_membrane::UntrustedAddr;

use crate::errno::EFAULT;

/// Successful result of a bounded string copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The limit was not positive; nothing was read or written.
    NoWork,
    /// The whole string fit. Holds the bytes now valid in `dst`, terminator
    /// included.
    Copied(usize),
    /// The string did not fit. Holds the limit; `dst[limit - 1]` is NUL.
    Truncated(usize),
}

impl CopyOutcome {
    /// Bytes of `dst` that form the C string, terminator included.
    #[must_use]
    pub const fn valid_bytes(self) -> usize {
        match self {
            Self::NoWork => 0,
            Self::Copied(n) | Self::Truncated(n) => n,
        }
    }

    #[must_use]
    pub const fn is_truncated(self) -> bool {
        matches!(self, Self::Truncated(_))
    }

    /// `0` for no work, otherwise the byte count.
    #[must_use]
    pub const fn legacy(self) -> i64 {
        self.valid_bytes() as i64
    }
}

/// Why a no-fault operation refused to produce data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NoFaultError {
    /// Some byte the operation needed could not be read. The destination
    /// content is unspecified and must not be consumed.
    #[error("source address {addr:#x} is unreadable")]
    UnreadableSource { addr: UntrustedAddr },
}

impl NoFaultError {
    /// Positive errno for this error.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::UnreadableSource { .. } => EFAULT,
        }
    }

    /// Negative errno, as returned across the C boundary.
    #[must_use]
    pub const fn legacy(self) -> i64 {
        -(self.errno() as i64)
    }
}

/// Project a string-copy result onto the signed-integer convention:
/// `> 0` bytes valid (`== limit` when truncated), `0` no work, `< 0` fault.
#[must_use]
pub fn legacy_code(result: &Result<CopyOutcome, NoFaultError>) -> i64 {
    match result {
        Ok(outcome) => outcome.legacy(),
        Err(err) => err.legacy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_projection() {
        assert_eq!(legacy_code(&Ok(CopyOutcome::NoWork)), 0);
        assert_eq!(legacy_code(&Ok(CopyOutcome::Copied(3))), 3);
        assert_eq!(legacy_code(&Ok(CopyOutcome::Truncated(5))), 5);
        let err = NoFaultError::UnreadableSource {
            addr: UntrustedAddr::new(0x1000),
        };
        assert_eq!(legacy_code(&Err(err)), -14);
    }

    #[test]
    fn valid_bytes_and_truncation_flag() {
        assert_eq!(CopyOutcome::NoWork.valid_bytes(), 0);
        assert_eq!(CopyOutcome::Copied(1).valid_bytes(), 1);
        assert!(CopyOutcome::Truncated(4).is_truncated());
        assert!(!CopyOutcome::Copied(4).is_truncated());
    }

    #[test]
    fn error_message_names_address() {
        let err = NoFaultError::UnreadableSource {
            addr: UntrustedAddr::new(0xdead_0000),
        };
        assert_eq!(err.to_string(), "source address 0xdead0000 is unreadable");
        assert_eq!(err.errno(), EFAULT);
    }
}
