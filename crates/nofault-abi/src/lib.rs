// All extern "C" exports take raw pointers from C callers; the untrusted side
// is handled by the membrane, the trusted side is the caller's contract.
#![allow(clippy::missing_safety_doc)]
//! # nofault-abi
//!
//! `extern "C"` boundary for nofault. Produces a `cdylib` exporting the
//! no-fault copies with the signed-integer return convention C callers
//! expect. Each export projects the tagged Rust outcome from `nofault-core`.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> nofault-core -> membrane reader -> return code
//! ```

#[macro_use]
mod macros;

pub mod copy_abi;

pub use copy_abi::{copy_from_user_nofault, strncpy_from_user_nofault, strnlen_user_nofault};
