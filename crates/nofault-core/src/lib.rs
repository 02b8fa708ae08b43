//! # nofault-core
//!
//! Copies out of untrusted addresses that can never crash the caller.
//!
//! Every operation enters a [`NoFaultScope`](nofault_membrane::NoFaultScope),
//! runs one raw primitive from `nofault-membrane`, leaves the scope and then
//! maps the raw result onto a tagged outcome. The only error is
//! [`NoFaultError::UnreadableSource`].
//!
//! No `unsafe` code is permitted in this crate.

#![deny(unsafe_code)]

pub mod copy;
pub mod errno;
pub mod length;
pub mod outcome;
pub mod string;

pub use copy::{copy_nofault, copy_nofault_with};
pub use length::{LengthOutcome, strnlen_nofault, strnlen_nofault_with};
pub use nofault_membrane::UntrustedAddr;
pub use outcome::{CopyOutcome, NoFaultError, legacy_code};
pub use string::{copy_string_nofault, copy_string_nofault_with};
