//! Reader back-end configuration.
//!
//! The back end is chosen by the `NOFAULT_READER` environment variable:
//! - `auto` (default): `process_vm_readv` against our own pid, falling back to
//!   the pipe reader for the rest of the process if the kernel refuses it
//!   (`ENOSYS`, or `EPERM` under a seccomp/ptrace policy).
//! - `process_vm`: `process_vm_readv` only. A refusal is reported as a fault.
//! - `pipe`: `write(2)` the untrusted range into a per-thread pipe and read it
//!   back. Works anywhere `write` reports `EFAULT`.

use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted on first use.
pub const READER_ENV: &str = "NOFAULT_READER";

/// How untrusted bytes are fetched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderBackend {
    /// `process_vm_readv`, with a one-way latch to `Pipe` if unsupported.
    #[default]
    Auto,
    /// `process_vm_readv` only.
    ProcessVm,
    /// Per-thread pipe round trip.
    Pipe,
}

impl ReaderBackend {
    /// Parse from string (case-insensitive). Unknown values mean `Auto`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "process_vm" | "process-vm" | "vm" | "pvm" => Self::ProcessVm,
            "pipe" | "write" => Self::Pipe,
            _ => Self::Auto,
        }
    }

    /// Stable lowercase name, as accepted by [`Self::from_str_loose`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::ProcessVm => "process_vm",
            Self::Pipe => "pipe",
        }
    }
}

// Atomic cache: 0=unresolved, 1=Auto, 2=ProcessVm, 3=Pipe, 255=resolving.
// A non-blocking state machine rather than OnceLock: the copy path must never
// wait on another thread that happens to be reading the environment.
static CACHED_BACKEND: AtomicU8 = AtomicU8::new(0);

const BACKEND_UNRESOLVED: u8 = 0;
const BACKEND_AUTO: u8 = 1;
const BACKEND_PROCESS_VM: u8 = 2;
const BACKEND_PIPE: u8 = 3;
const BACKEND_RESOLVING: u8 = 255;

// Set once `Auto` has seen process_vm_readv refused.
static AUTO_LATCHED_PIPE: AtomicU8 = AtomicU8::new(0);

fn backend_to_u8(backend: ReaderBackend) -> u8 {
    match backend {
        ReaderBackend::Auto => BACKEND_AUTO,
        ReaderBackend::ProcessVm => BACKEND_PROCESS_VM,
        ReaderBackend::Pipe => BACKEND_PIPE,
    }
}

fn u8_to_backend(v: u8) -> ReaderBackend {
    match v {
        BACKEND_PROCESS_VM => ReaderBackend::ProcessVm,
        BACKEND_PIPE => ReaderBackend::Pipe,
        _ => ReaderBackend::Auto,
    }
}

/// Configured reader back end (reads the environment on first call).
///
/// A caller that arrives while another thread is resolving gets `Auto`
/// instead of waiting.
#[must_use]
pub fn reader_backend() -> ReaderBackend {
    let cached = CACHED_BACKEND.load(Ordering::Acquire);

    if cached != BACKEND_UNRESOLVED && cached != BACKEND_RESOLVING {
        return u8_to_backend(cached);
    }

    if cached == BACKEND_RESOLVING {
        return ReaderBackend::Auto;
    }

    if CACHED_BACKEND
        .compare_exchange(
            BACKEND_UNRESOLVED,
            BACKEND_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_BACKEND.load(Ordering::Acquire);
        return if v != BACKEND_UNRESOLVED && v != BACKEND_RESOLVING {
            u8_to_backend(v)
        } else {
            ReaderBackend::Auto
        };
    }

    let backend = std::env::var(READER_ENV)
        .map(|v| ReaderBackend::from_str_loose(&v))
        .unwrap_or_default();
    // A concurrent set_reader_backend wins over the environment.
    let _ = CACHED_BACKEND.compare_exchange(
        BACKEND_RESOLVING,
        backend_to_u8(backend),
        Ordering::SeqCst,
        Ordering::Relaxed,
    );
    u8_to_backend(CACHED_BACKEND.load(Ordering::Acquire))
}

/// Override the back end for the rest of the process.
pub fn set_reader_backend(backend: ReaderBackend) {
    CACHED_BACKEND.store(backend_to_u8(backend), Ordering::Release);
}

/// True once `Auto` has fallen back to the pipe reader.
#[must_use]
pub fn auto_fell_back() -> bool {
    AUTO_LATCHED_PIPE.load(Ordering::Relaxed) != 0
}

/// Record that `process_vm_readv` is unavailable. Returns true on the first
/// call only.
pub(crate) fn latch_auto_fallback() -> bool {
    AUTO_LATCHED_PIPE.swap(1, Ordering::Relaxed) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backends() {
        assert_eq!(ReaderBackend::from_str_loose("auto"), ReaderBackend::Auto);
        assert_eq!(ReaderBackend::from_str_loose("AUTO"), ReaderBackend::Auto);
        assert_eq!(
            ReaderBackend::from_str_loose("process_vm"),
            ReaderBackend::ProcessVm
        );
        assert_eq!(
            ReaderBackend::from_str_loose("Process-VM"),
            ReaderBackend::ProcessVm
        );
        assert_eq!(ReaderBackend::from_str_loose("pvm"), ReaderBackend::ProcessVm);
        assert_eq!(ReaderBackend::from_str_loose(" pipe "), ReaderBackend::Pipe);
        assert_eq!(ReaderBackend::from_str_loose("bogus"), ReaderBackend::Auto);
        assert_eq!(ReaderBackend::from_str_loose(""), ReaderBackend::Auto);
    }

    #[test]
    fn names_round_trip_through_loose_parser() {
        for backend in [
            ReaderBackend::Auto,
            ReaderBackend::ProcessVm,
            ReaderBackend::Pipe,
        ] {
            assert_eq!(ReaderBackend::from_str_loose(backend.as_str()), backend);
        }
    }

    #[test]
    fn default_is_auto() {
        assert_eq!(ReaderBackend::default(), ReaderBackend::Auto);
    }

    #[test]
    fn resolving_state_returns_auto() {
        let previous = CACHED_BACKEND.swap(BACKEND_RESOLVING, Ordering::SeqCst);
        assert_eq!(reader_backend(), ReaderBackend::Auto);
        CACHED_BACKEND.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn cached_backend_is_sticky() {
        let previous = CACHED_BACKEND.swap(BACKEND_PIPE, Ordering::SeqCst);
        assert_eq!(reader_backend(), ReaderBackend::Pipe);
        assert_eq!(reader_backend(), ReaderBackend::Pipe);
        CACHED_BACKEND.store(previous, Ordering::SeqCst);
    }
}
