//! No-fault copies with C return conventions.
//!
//! - `strncpy_from_user_nofault`: `> 0` valid bytes including NUL (`== count` when
//!   truncated, `dst[count - 1] == 0`), `0` when `count <= 0`, `-EFAULT` when
//!   the source is unreadable.
//! - `strnlen_user_nofault`: size including NUL, `count + 1` when longer than
//!   `count`, `0` on fault or `count <= 0`.
//! - `copy_from_user_nofault`: `0` or `-EFAULT`.
//!
//! A null *destination* with work to do is a caller bug; it is refused with
//! `-EINVAL` before anything is read.

use std::ffi::{c_char, c_long, c_void};

use nofault_core::errno::{EFAULT, EINVAL};
use nofault_core::{UntrustedAddr, legacy_code};

abi_fn! {
    /// Copy a NUL-terminated string of at most `count` bytes from an
    /// untrusted address.
    fn strncpy_from_user_nofault(
        dst: *mut c_char,
        unsafe_addr: *const c_void,
        count: c_long,
    ) -> c_long {
        let src = UntrustedAddr::from_ptr(unsafe_addr);
        if count <= 0 {
            let outcome = nofault_core::copy_string_nofault(&mut [], src, count as isize);
            return legacy_code(&outcome) as c_long;
        }
        if dst.is_null() {
            return -(EINVAL as c_long);
        }
        // Caller guarantees `dst` is writable for `count` bytes.
        let dst = std::slice::from_raw_parts_mut(dst.cast::<u8>(), count as usize);
        legacy_code(&nofault_core::copy_string_nofault(dst, src, count as isize)) as c_long
    }
}

abi_fn! {
    /// Size of the string at an untrusted address, bounded by `count`.
    fn strnlen_user_nofault(unsafe_addr: *const c_void, count: c_long) -> c_long {
        match nofault_core::strnlen_nofault(UntrustedAddr::from_ptr(unsafe_addr), count as isize) {
            Ok(outcome) => outcome.legacy() as c_long,
            Err(_) => 0,
        }
    }
}

abi_fn! {
    /// Copy exactly `size` bytes from an untrusted address.
    fn copy_from_user_nofault(dst: *mut c_void, unsafe_addr: *const c_void, size: usize) -> c_long {
        if size == 0 {
            return 0;
        }
        if dst.is_null() {
            return -(EINVAL as c_long);
        }
        // Caller guarantees `dst` is writable for `size` bytes.
        let dst = std::slice::from_raw_parts_mut(dst.cast::<u8>(), size);
        match nofault_core::copy_nofault(dst, UntrustedAddr::from_ptr(unsafe_addr)) {
            Ok(()) => 0,
            Err(_) => -(EFAULT as c_long),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_count_returns_zero_without_touching_dst() {
        let mut dst = [0x7F as c_char; 4];
        let got = unsafe { strncpy_from_user_nofault(dst.as_mut_ptr(), std::ptr::null(), 0) };
        assert_eq!(got, 0);
        assert_eq!(dst, [0x7F; 4]);
    }

    #[test]
    fn null_destination_is_rejected() {
        let src = b"abc\0";
        let got =
            unsafe { strncpy_from_user_nofault(std::ptr::null_mut(), src.as_ptr().cast(), 4) };
        assert_eq!(got, -(EINVAL as c_long));
        let got = unsafe { copy_from_user_nofault(std::ptr::null_mut(), src.as_ptr().cast(), 4) };
        assert_eq!(got, -(EINVAL as c_long));
    }

    #[test]
    fn null_source_faults() {
        let mut dst = [0 as c_char; 8];
        let got = unsafe { strncpy_from_user_nofault(dst.as_mut_ptr(), std::ptr::null(), 8) };
        assert_eq!(got, -(EFAULT as c_long));
        assert_eq!(unsafe { strnlen_user_nofault(std::ptr::null(), 8) }, 0);
    }
}
