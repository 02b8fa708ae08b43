//! Untrusted reader back ends.
//!
//! A reader copies bytes from an [`UntrustedAddr`] into a trusted slice and
//! reports an invalid source as a [`ReadFault`]. None of them dereference the
//! untrusted address in user space: the kernel performs the access and
//! returns `EFAULT`, so a bad address can never deliver `SIGSEGV` to us.
//!
//! Readers do not chunk. Callers in [`crate::raw`] split requests at page
//! boundaries so that a fault always means "this page is unreadable".

use std::cell::RefCell;
use std::ffi::c_void;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use thiserror::Error;

use crate::addr::UntrustedAddr;
use crate::config::{self, ReaderBackend};
use crate::scope::NoFaultScope;
use crate::stats::global_stats;

/// Failure of a single untrusted read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadFault {
    /// The source range (or part of it) could not be read.
    #[error("untrusted read of {len} bytes at {addr:#x} faulted (errno {errno})")]
    Fault {
        addr: UntrustedAddr,
        len: usize,
        errno: i32,
    },
    /// The back end itself is refused by the kernel.
    #[error("reader back end unavailable (errno {errno})")]
    Unsupported { errno: i32 },
}

/// Fetches bytes from untrusted addresses without trapping.
pub trait UntrustedReader {
    /// Fill all of `dst` from `src`, or fail.
    ///
    /// The `scope` argument proves the caller is inside a no-fault scope.
    /// On failure the content of `dst` is unspecified.
    fn read(
        &self,
        scope: &NoFaultScope,
        dst: &mut [u8],
        src: UntrustedAddr,
    ) -> Result<(), ReadFault>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

impl<R: UntrustedReader + ?Sized> UntrustedReader for &R {
    fn read(
        &self,
        scope: &NoFaultScope,
        dst: &mut [u8],
        src: UntrustedAddr,
    ) -> Result<(), ReadFault> {
        (**self).read(scope, dst, src)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

// ---------------------------------------------------------------------------
// process_vm_readv
// ---------------------------------------------------------------------------

/// Reads through `process_vm_readv(2)` targeting the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessVmReader;

impl UntrustedReader for ProcessVmReader {
    fn read(
        &self,
        _scope: &NoFaultScope,
        dst: &mut [u8],
        src: UntrustedAddr,
    ) -> Result<(), ReadFault> {
        if dst.is_empty() {
            return Ok(());
        }
        let len = dst.len();
        let local = libc::iovec {
            iov_base: dst.as_mut_ptr().cast::<c_void>(),
            iov_len: len,
        };
        let remote = libc::iovec {
            iov_base: src.get() as *mut c_void,
            iov_len: len,
        };

        // SAFETY: `local` describes exactly `dst`, which we borrow mutably.
        // The remote range is validated by the kernel, which returns EFAULT
        // instead of touching it from our context.
        let n = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
        if n < 0 {
            let errno = last_errno();
            return Err(match errno {
                libc::ENOSYS | libc::EPERM => ReadFault::Unsupported { errno },
                _ => ReadFault::Fault {
                    addr: src,
                    len,
                    errno,
                },
            });
        }
        if n as usize != len {
            return Err(ReadFault::Fault {
                addr: src,
                len,
                errno: libc::EFAULT,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "process_vm"
    }
}

// ---------------------------------------------------------------------------
// Pipe round trip
// ---------------------------------------------------------------------------

struct ThreadPipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl ThreadPipe {
    fn open() -> Result<Self, i32> {
        let mut fds = [-1; 2];
        // SAFETY: `fds` has room for the two descriptors pipe2 writes.
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        if rc != 0 {
            return Err(last_errno());
        }
        // SAFETY: pipe2 succeeded, so both descriptors are fresh and owned by us.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Self { read, write })
    }

    /// Discard anything left in the pipe.
    fn drain(&self) {
        let mut scratch = [0_u8; 256];
        loop {
            // SAFETY: reading into a local buffer of the stated size.
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    scratch.as_mut_ptr().cast::<c_void>(),
                    scratch.len(),
                )
            };
            if n <= 0 {
                return;
            }
        }
    }

    fn transfer(&self, dst: &mut [u8], src: UntrustedAddr) -> Result<(), ReadFault> {
        let len = dst.len();
        let mut done = 0;
        while done < len {
            let chunk = (len - done).min(libc::PIPE_BUF);
            let addr = src.checked_add(done).ok_or(ReadFault::Fault {
                addr: src,
                len,
                errno: libc::EFAULT,
            })?;

            // SAFETY: the kernel copies from `addr` on our behalf and reports
            // EFAULT for an invalid range; we never dereference it here.
            let written = unsafe {
                libc::write(
                    self.write.as_raw_fd(),
                    addr.get() as *const c_void,
                    chunk,
                )
            };
            if written < 0 {
                let errno = last_errno();
                self.drain();
                return Err(ReadFault::Fault { addr, len: chunk, errno });
            }
            let written = written as usize;

            let out = &mut dst[done..done + written];
            // SAFETY: `out` is a live, exclusively borrowed slice of `written` bytes.
            let got = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    out.as_mut_ptr().cast::<c_void>(),
                    written,
                )
            };
            if got < 0 || got as usize != written || written < chunk {
                self.drain();
                return Err(ReadFault::Fault {
                    addr,
                    len: chunk,
                    errno: libc::EFAULT,
                });
            }
            done += written;
        }
        Ok(())
    }
}

thread_local! {
    static PIPE: RefCell<Option<ThreadPipe>> = const { RefCell::new(None) };
}

/// Reads by writing the untrusted range into a per-thread non-blocking pipe
/// and reading it back. `write(2)` reports an invalid source as `EFAULT`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipeReader;

impl UntrustedReader for PipeReader {
    fn read(
        &self,
        _scope: &NoFaultScope,
        dst: &mut [u8],
        src: UntrustedAddr,
    ) -> Result<(), ReadFault> {
        if dst.is_empty() {
            return Ok(());
        }
        PIPE.with(|cell| {
            let Ok(mut slot) = cell.try_borrow_mut() else {
                return Err(ReadFault::Unsupported { errno: libc::EBUSY });
            };
            if slot.is_none() {
                *slot = Some(ThreadPipe::open().map_err(|errno| ReadFault::Unsupported { errno })?);
            }
            match slot.as_ref() {
                Some(pipe) => pipe.transfer(dst, src),
                None => Err(ReadFault::Unsupported { errno: libc::EBADF }),
            }
        })
    }

    fn name(&self) -> &'static str {
        "pipe"
    }
}

// ---------------------------------------------------------------------------
// Configured reader
// ---------------------------------------------------------------------------

// `auto`: try `primary`; once it is refused, latch to the pipe for good and
// count the switch once.
fn read_auto<P: UntrustedReader + ?Sized>(
    primary: &P,
    scope: &NoFaultScope,
    dst: &mut [u8],
    src: UntrustedAddr,
) -> Result<(), ReadFault> {
    if config::auto_fell_back() {
        return PipeReader.read(scope, dst, src);
    }
    match primary.read(scope, dst, src) {
        Err(ReadFault::Unsupported { .. }) => {
            if config::latch_auto_fallback() {
                global_stats().record_fallback();
            }
            PipeReader.read(scope, dst, src)
        }
        other => other,
    }
}

/// Reader selected by [`config::reader_backend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemReader;

impl UntrustedReader for SystemReader {
    fn read(
        &self,
        scope: &NoFaultScope,
        dst: &mut [u8],
        src: UntrustedAddr,
    ) -> Result<(), ReadFault> {
        match config::reader_backend() {
            ReaderBackend::ProcessVm => ProcessVmReader.read(scope, dst, src),
            ReaderBackend::Pipe => PipeReader.read(scope, dst, src),
            ReaderBackend::Auto => read_auto(&ProcessVmReader, scope, dst, src),
        }
    }

    fn name(&self) -> &'static str {
        match config::reader_backend() {
            ReaderBackend::ProcessVm => "process_vm",
            ReaderBackend::Pipe => "pipe",
            ReaderBackend::Auto if config::auto_fell_back() => "pipe",
            ReaderBackend::Auto => "process_vm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guarded::GuardedRegion;

    fn read_with(
        reader: &dyn UntrustedReader,
        src: UntrustedAddr,
        len: usize,
    ) -> Result<Vec<u8>, ReadFault> {
        let scope = NoFaultScope::enter();
        let mut dst = vec![0_u8; len];
        reader.read(&scope, &mut dst, src)?;
        Ok(dst)
    }

    fn readers() -> Vec<Box<dyn UntrustedReader>> {
        vec![Box::new(PipeReader), Box::new(SystemReader)]
    }

    #[test]
    fn reads_valid_memory() {
        let data = *b"membrane";
        for reader in readers() {
            let src = UntrustedAddr::from_ptr(data.as_ptr());
            let got = read_with(reader.as_ref(), src, data.len());
            assert_eq!(got.as_deref(), Ok(&data[..]), "reader {}", reader.name());
        }
    }

    #[test]
    fn null_address_faults() {
        for reader in readers() {
            let err = read_with(reader.as_ref(), UntrustedAddr::NULL, 8).unwrap_err();
            assert!(
                matches!(err, ReadFault::Fault { .. }),
                "reader {} gave {err:?}",
                reader.name()
            );
        }
    }

    #[test]
    fn guard_page_faults() {
        let region = GuardedRegion::new(1).unwrap();
        for reader in readers() {
            let err = read_with(reader.as_ref(), region.unreadable_addr(), 4).unwrap_err();
            assert!(matches!(err, ReadFault::Fault { .. }));
        }
    }

    #[test]
    fn pipe_is_left_empty_after_fault() {
        let region = GuardedRegion::new(1).unwrap();
        let src = region.place_at_end(b"tail");
        assert!(read_with(&PipeReader, region.unreadable_addr(), 16).is_err());
        assert_eq!(read_with(&PipeReader, src, 4).unwrap(), b"tail");
    }

    #[test]
    fn empty_read_never_touches_source() {
        for reader in readers() {
            assert_eq!(read_with(reader.as_ref(), UntrustedAddr::NULL, 0), Ok(Vec::new()));
        }
    }

    #[test]
    fn fault_display_names_address() {
        let fault = ReadFault::Fault {
            addr: UntrustedAddr::new(0x1000),
            len: 4,
            errno: libc::EFAULT,
        };
        assert_eq!(
            fault.to_string(),
            format!(
                "untrusted read of 4 bytes at 0x1000 faulted (errno {})",
                libc::EFAULT
            )
        );
    }

    /// Primary back end the kernel refuses outright.
    struct RefusedReader {
        calls: std::cell::Cell<usize>,
    }

    impl UntrustedReader for RefusedReader {
        fn read(
            &self,
            _scope: &NoFaultScope,
            _dst: &mut [u8],
            _src: UntrustedAddr,
        ) -> Result<(), ReadFault> {
            self.calls.set(self.calls.get() + 1);
            Err(ReadFault::Unsupported {
                errno: libc::ENOSYS,
            })
        }

        fn name(&self) -> &'static str {
            "refused"
        }
    }

    #[test]
    fn auto_latches_to_pipe_once_refused() {
        let primary = RefusedReader {
            calls: std::cell::Cell::new(0),
        };
        let data = *b"fallback";
        let src = UntrustedAddr::from_ptr(data.as_ptr());
        // The latch is process-wide; it fires (and is counted) exactly once.
        let latched_before = config::auto_fell_back();
        let before = global_stats().snapshot().reader_fallbacks;

        let scope = NoFaultScope::enter();
        let mut first = [0_u8; 8];
        assert_eq!(read_auto(&primary, &scope, &mut first, src), Ok(()));
        assert_eq!(&first, b"fallback");
        assert!(config::auto_fell_back());

        let mut second = [0_u8; 8];
        assert_eq!(read_auto(&primary, &scope, &mut second, src), Ok(()));
        assert_eq!(&second, b"fallback");

        let after = global_stats().snapshot().reader_fallbacks;
        assert_eq!(after - before, u64::from(!latched_before));
        // Once latched, the refused back end is never asked again.
        assert!(primary.calls.get() <= 1);
    }

    #[test]
    fn refused_back_end_reads_as_fault() {
        let primary = RefusedReader {
            calls: std::cell::Cell::new(0),
        };
        let data = *b"never\0";
        let scope = NoFaultScope::enter();
        let mut dst = [0_u8; 8];
        assert_eq!(
            crate::raw::raw_copy_string(
                &primary,
                &scope,
                &mut dst,
                UntrustedAddr::from_ptr(data.as_ptr())
            ),
            crate::raw::RawCopy::Fault
        );
        assert_eq!(primary.calls.get(), 1);
    }
}
