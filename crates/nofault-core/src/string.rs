//! Bounded NUL-terminated string copy from an untrusted address.

use nofault_membrane::{
    NoFaultScope, RawCopy, SystemReader, UntrustedAddr, UntrustedReader, global_stats,
    raw_copy_string,
};

use crate::outcome::{CopyOutcome, NoFaultError};

/// Copy a C string of at most `limit` bytes (terminator included) from `src`
/// into `dst`, using the configured system reader.
///
/// See [`copy_string_nofault_with`] for the outcome contract.
///
/// # Panics
///
/// Panics if `limit` is positive and `dst.len() < limit`.
pub fn copy_string_nofault(
    dst: &mut [u8],
    src: UntrustedAddr,
    limit: isize,
) -> Result<CopyOutcome, NoFaultError> {
    copy_string_nofault_with(&SystemReader, dst, src, limit)
}

/// Copy a C string of at most `limit` bytes from `src` through `reader`.
///
/// - `limit <= 0`: [`CopyOutcome::NoWork`]; `dst` is not touched.
/// - no NUL within `limit` bytes: [`CopyOutcome::Truncated`]`(limit)` and
///   `dst[limit - 1]` is forced to NUL.
/// - string of length `L < limit`: [`CopyOutcome::Copied`]`(L + 1)`, with
///   `dst[L] == 0`. An empty string gives `Copied(1)`.
/// - unreadable source: [`NoFaultError::UnreadableSource`]; `dst` content
///   is unspecified.
///
/// The no-fault scope is held only around the raw copy and is released on
/// every path before the result is interpreted.
///
/// # Panics
///
/// Panics if `limit` is positive and `dst.len() < limit`.
pub fn copy_string_nofault_with<R: UntrustedReader + ?Sized>(
    reader: &R,
    dst: &mut [u8],
    src: UntrustedAddr,
    limit: isize,
) -> Result<CopyOutcome, NoFaultError> {
    let stats = global_stats();
    if limit <= 0 {
        stats.record_noop();
        return Ok(CopyOutcome::NoWork);
    }
    let limit = limit.unsigned_abs();
    let dst = &mut dst[..limit];

    let raw = {
        let scope = NoFaultScope::enter();
        raw_copy_string(reader, &scope, dst, src)
    };

    // Truncation is checked before the terminator increment.
    match raw {
        RawCopy::Fault => {
            stats.record_fault();
            Err(NoFaultError::UnreadableSource { addr: src })
        }
        RawCopy::Written(len) if len >= limit => {
            dst[limit - 1] = 0;
            stats.record_truncated(limit);
            Ok(CopyOutcome::Truncated(limit))
        }
        RawCopy::Written(len) => {
            stats.record_copied(len + 1);
            Ok(CopyOutcome::Copied(len + 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nofault_membrane::{ReadFault, nofault_depth};
    use std::cell::Cell;

    /// Serves a fixed string at any address, or faults on every read.
    struct ScriptedReader {
        data: Option<Vec<u8>>,
        depth_seen: Cell<Option<u32>>,
    }

    impl ScriptedReader {
        fn serving(bytes: &[u8]) -> Self {
            Self {
                data: Some(bytes.to_vec()),
                depth_seen: Cell::new(None),
            }
        }

        fn faulting() -> Self {
            Self {
                data: None,
                depth_seen: Cell::new(None),
            }
        }
    }

    impl UntrustedReader for ScriptedReader {
        fn read(
            &self,
            _scope: &NoFaultScope,
            dst: &mut [u8],
            src: UntrustedAddr,
        ) -> Result<(), ReadFault> {
            self.depth_seen.set(Some(nofault_depth()));
            let fault = ReadFault::Fault {
                addr: src,
                len: dst.len(),
                errno: crate::errno::EFAULT,
            };
            let data = self.data.as_ref().ok_or(fault)?;
            let offset = src.get() - BASE;
            for (i, byte) in dst.iter_mut().enumerate() {
                *byte = data.get(offset + i).copied().unwrap_or(b'#');
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    const BASE: usize = 0x7000_0000;

    fn run(
        reader: &ScriptedReader,
        dst: &mut [u8],
        limit: isize,
    ) -> Result<CopyOutcome, NoFaultError> {
        copy_string_nofault_with(reader, dst, UntrustedAddr::new(BASE), limit)
    }

    #[test]
    fn non_positive_limit_is_no_work() {
        let reader = ScriptedReader::serving(b"abc\0");
        for limit in [0, -1, isize::MIN] {
            let mut dst = [0xAA_u8; 4];
            assert_eq!(run(&reader, &mut dst, limit), Ok(CopyOutcome::NoWork));
            assert_eq!(dst, [0xAA; 4]);
        }
        assert_eq!(reader.depth_seen.get(), None);
    }

    #[test]
    fn short_string_reports_length_with_terminator() {
        let reader = ScriptedReader::serving(b"ab\0");
        let mut dst = [0xAA_u8; 5];
        assert_eq!(run(&reader, &mut dst, 5), Ok(CopyOutcome::Copied(3)));
        assert_eq!(&dst[..3], b"ab\0");
    }

    #[test]
    fn long_string_is_truncated_and_terminated() {
        let reader = ScriptedReader::serving(b"hello\0");
        let mut dst = [0xAA_u8; 3];
        assert_eq!(run(&reader, &mut dst, 3), Ok(CopyOutcome::Truncated(3)));
        assert_eq!(&dst, b"he\0");
    }

    #[test]
    fn exact_fit_is_copied_not_truncated() {
        // "abcd" + NUL needs exactly five bytes.
        let reader = ScriptedReader::serving(b"abcd\0");
        let mut dst = [0_u8; 5];
        assert_eq!(run(&reader, &mut dst, 5), Ok(CopyOutcome::Copied(5)));
        assert_eq!(&dst, b"abcd\0");
    }

    #[test]
    fn one_byte_over_is_truncated() {
        let reader = ScriptedReader::serving(b"abcde\0");
        let mut dst = [0_u8; 5];
        assert_eq!(run(&reader, &mut dst, 5), Ok(CopyOutcome::Truncated(5)));
        assert_eq!(&dst, b"abcd\0");
    }

    #[test]
    fn limit_one_non_empty_truncates() {
        let reader = ScriptedReader::serving(b"x\0");
        let mut dst = [0xAA_u8; 1];
        assert_eq!(run(&reader, &mut dst, 1), Ok(CopyOutcome::Truncated(1)));
        assert_eq!(dst, [0]);
    }

    #[test]
    fn limit_one_empty_is_copied() {
        let reader = ScriptedReader::serving(b"\0");
        let mut dst = [0xAA_u8; 1];
        assert_eq!(run(&reader, &mut dst, 1), Ok(CopyOutcome::Copied(1)));
        assert_eq!(dst, [0]);
    }

    #[test]
    fn empty_string_is_copied_one() {
        let reader = ScriptedReader::serving(b"\0rest");
        let mut dst = [0xAA_u8; 8];
        assert_eq!(run(&reader, &mut dst, 8), Ok(CopyOutcome::Copied(1)));
        assert_eq!(dst[0], 0);
    }

    #[test]
    fn fault_is_reported_and_scope_released() {
        let reader = ScriptedReader::faulting();
        let before = nofault_depth();
        let mut dst = [0_u8; 5];
        assert_eq!(
            run(&reader, &mut dst, 5),
            Err(NoFaultError::UnreadableSource {
                addr: UntrustedAddr::new(BASE)
            })
        );
        assert_eq!(reader.depth_seen.get(), Some(before + 1));
        assert_eq!(nofault_depth(), before);
    }

    #[test]
    fn scope_released_after_success() {
        let reader = ScriptedReader::serving(b"ok\0");
        let before = nofault_depth();
        let mut dst = [0_u8; 8];
        assert!(run(&reader, &mut dst, 8).is_ok());
        assert_eq!(reader.depth_seen.get(), Some(before + 1));
        assert_eq!(nofault_depth(), before);
    }

    #[test]
    fn only_first_limit_bytes_are_written() {
        let reader = ScriptedReader::serving(b"abcdefgh\0");
        let mut dst = [0xAA_u8; 8];
        assert_eq!(run(&reader, &mut dst, 4), Ok(CopyOutcome::Truncated(4)));
        assert_eq!(&dst[..4], b"abc\0");
        assert_eq!(&dst[4..], &[0xAA; 4]);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let reader = ScriptedReader::serving(b"stable\0");
        let mut first = [0_u8; 16];
        let mut second = [0_u8; 16];
        let a = run(&reader, &mut first, 16);
        let b = run(&reader, &mut second, 16);
        assert_eq!(a, b);
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic]
    fn limit_beyond_capacity_panics() {
        let reader = ScriptedReader::serving(b"abc\0");
        let mut dst = [0_u8; 2];
        let _ = run(&reader, &mut dst, 3);
    }
}
