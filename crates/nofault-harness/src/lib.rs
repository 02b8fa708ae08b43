//! Self-test and probe harness for nofault.
//!
//! This crate provides:
//! - Scenario matrix: every outcome of the bounded string copy exercised on
//!   guarded pages, plus a multi-threaded independence check
//! - Probe: one copy against an address in this process
//! - Structured JSONL logging and validation for both

#![forbid(unsafe_code)]

pub mod error;
pub mod probe;
pub mod scenarios;
pub mod structured_log;

pub use error::HarnessError;
pub use probe::{ProbeRecord, parse_addr, probe};
pub use scenarios::{Scenario, ScenarioResult, SelftestConfig, SelftestReport, run_selftest};
