//! Fixed-size copy from an untrusted address.

use nofault_membrane::{
    NoFaultScope, SystemReader, UntrustedAddr, UntrustedReader, global_stats, raw_copy,
};

use crate::outcome::NoFaultError;

/// Fill all of `dst` from `src` using the configured system reader.
pub fn copy_nofault(dst: &mut [u8], src: UntrustedAddr) -> Result<(), NoFaultError> {
    copy_nofault_with(&SystemReader, dst, src)
}

/// Fill all of `dst` from `src` through `reader`.
///
/// Either every byte is copied or the call fails with
/// [`NoFaultError::UnreadableSource`] and `dst` is unspecified. An empty
/// `dst` always succeeds without reading.
pub fn copy_nofault_with<R: UntrustedReader + ?Sized>(
    reader: &R,
    dst: &mut [u8],
    src: UntrustedAddr,
) -> Result<(), NoFaultError> {
    let stats = global_stats();
    if dst.is_empty() {
        stats.record_noop();
        return Ok(());
    }
    let result = {
        let scope = NoFaultScope::enter();
        raw_copy(reader, &scope, dst, src)
    };
    match result {
        Ok(()) => {
            stats.record_copied(dst.len());
            Ok(())
        }
        Err(_) => {
            stats.record_fault();
            Err(NoFaultError::UnreadableSource { addr: src })
        }
    }
}
