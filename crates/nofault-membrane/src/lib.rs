//! # nofault-membrane
//!
//! The boundary between trusted memory and addresses handed in by an
//! untrusted party. Everything that touches an untrusted address lives here:
//!
//! - [`scope`]: the counted, per-thread no-fault scope ([`NoFaultScope`]).
//! - [`reader`]: back ends that read an untrusted address and report `EFAULT`
//!   as a value instead of raising `SIGSEGV`.
//! - [`raw`]: the raw bounded primitives (string copy, strnlen, fixed copy)
//!   built on a reader. They require a live scope token.
//! - [`config`]: reader back-end selection (`NOFAULT_READER`).
//! - [`stats`]: lock-free outcome counters.
//! - [`guarded`]: a readable-then-`PROT_NONE` page fixture for tests, the
//!   harness and benchmarks.

pub mod addr;
pub mod config;
pub mod guarded;
pub mod raw;
pub mod reader;
pub mod scope;
pub mod stats;

pub use addr::{UntrustedAddr, page_size};
pub use config::{ReaderBackend, reader_backend, set_reader_backend};
pub use guarded::GuardedRegion;
pub use raw::{RawCopy, RawLength, raw_copy, raw_copy_string, raw_strnlen};
pub use reader::{PipeReader, ProcessVmReader, ReadFault, SystemReader, UntrustedReader};
pub use scope::{NoFaultScope, in_nofault_scope, nofault_depth};
pub use stats::{CopyStats, StatsSnapshot, global_stats};
