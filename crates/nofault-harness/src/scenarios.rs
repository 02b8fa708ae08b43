//! Scenario matrix for the bounded string copy.
//!
//! Each scenario places a source next to a `PROT_NONE` page, calls
//! [`copy_string_nofault`] and compares the legacy return code and the
//! destination bytes with what the contract promises. A second phase runs
//! the same copies from several threads at once.

use std::time::Instant;

use nofault_core::errno::EFAULT;
use nofault_core::{CopyOutcome, NoFaultError, UntrustedAddr, copy_string_nofault, legacy_code};
use nofault_membrane::{
    GuardedRegion, ReaderBackend, StatsSnapshot, global_stats, nofault_depth, reader_backend,
};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::HarnessError;
use crate::structured_log::{CopyTag, LogEmitter, LogEntry, LogLevel, Outcome};

/// Byte the destination is pre-filled with, to spot stray writes.
const POISON: u8 = 0xAA;

/// Where a scenario's source lives.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// Bytes placed so that the last one is followed by the guard page.
    AtGuardEdge(&'static [u8]),
    /// First byte of the guard page.
    Unreadable,
    /// Address zero.
    Null,
}

/// One row of the matrix.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub source: Source,
    pub limit: isize,
    /// Expected legacy return code.
    pub expected_code: i64,
    /// Expected destination prefix; `None` means untouched.
    pub expected_dst: Option<&'static [u8]>,
}

impl Scenario {
    const fn new(
        name: &'static str,
        source: Source,
        limit: isize,
        expected_code: i64,
        expected_dst: Option<&'static [u8]>,
    ) -> Self {
        Self {
            name,
            source,
            limit,
            expected_code,
            expected_dst,
        }
    }
}

const FAULT: i64 = -(EFAULT as i64);

/// The full matrix.
#[must_use]
pub fn scenarios() -> Vec<Scenario> {
    use Source::{AtGuardEdge, Null, Unreadable};
    vec![
        Scenario::new("short_string", AtGuardEdge(b"ab\0"), 5, 3, Some(b"ab\0")),
        Scenario::new("truncate_hello", AtGuardEdge(b"hello\0"), 3, 3, Some(b"he\0")),
        Scenario::new("exact_fit", AtGuardEdge(b"abcd\0"), 5, 5, Some(b"abcd\0")),
        Scenario::new("one_byte_short", AtGuardEdge(b"abcde\0"), 5, 5, Some(b"abcd\0")),
        Scenario::new("limit_stops_before_guard", AtGuardEdge(b"abcdef"), 4, 4, Some(b"abc\0")),
        Scenario::new("unterminated_into_guard", AtGuardEdge(b"abc"), 5, FAULT, None),
        Scenario::new("empty_string", AtGuardEdge(b"\0"), 8, 1, Some(b"\0")),
        Scenario::new("limit_one_empty", AtGuardEdge(b"\0"), 1, 1, Some(b"\0")),
        Scenario::new("limit_one_non_empty", AtGuardEdge(b"x\0"), 1, 1, Some(b"\0")),
        Scenario::new("unreadable_page", Unreadable, 5, FAULT, None),
        Scenario::new("null_source", Null, 8, FAULT, None),
        Scenario::new("zero_limit", Null, 0, 0, None),
        Scenario::new("negative_limit", Unreadable, -1, 0, None),
    ]
}

/// Outcome of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub limit: i64,
    pub expected_code: i64,
    pub result_code: i64,
    pub copy_tag: CopyTag,
    pub dst_ok: bool,
    pub passed: bool,
    pub latency_ns: u64,
}

/// Counters taken from the global stats across a run.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatsDelta {
    pub calls: u64,
    pub noops: u64,
    pub copied: u64,
    pub truncated: u64,
    pub faults: u64,
    pub bytes_delivered: u64,
    pub reader_fallbacks: u64,
}

impl StatsDelta {
    fn between(before: StatsSnapshot, after: StatsSnapshot) -> Self {
        Self {
            calls: after.calls.saturating_sub(before.calls),
            noops: after.noops.saturating_sub(before.noops),
            copied: after.copied.saturating_sub(before.copied),
            truncated: after.truncated.saturating_sub(before.truncated),
            faults: after.faults.saturating_sub(before.faults),
            bytes_delivered: after.bytes_delivered.saturating_sub(before.bytes_delivered),
            reader_fallbacks: after.reader_fallbacks.saturating_sub(before.reader_fallbacks),
        }
    }
}

/// Result of the concurrent phase.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadCheck {
    pub threads: usize,
    pub iterations: usize,
    pub mismatches: u64,
    /// Scope depth left behind by any worker; always zero when healthy.
    pub leaked_depth: u32,
}

/// Report of a full self-test run.
#[derive(Debug, Clone, Serialize)]
pub struct SelftestReport {
    pub run_id: String,
    pub reader: String,
    pub scenarios: Vec<ScenarioResult>,
    pub thread_check: ThreadCheck,
    pub stats: StatsDelta,
    pub passed: usize,
    pub failed: usize,
}

impl SelftestReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
            && self.thread_check.mismatches == 0
            && self.thread_check.leaked_depth == 0
    }
}

/// Knobs for [`run_selftest`].
#[derive(Debug, Clone)]
pub struct SelftestConfig {
    pub run_id: String,
    pub threads: usize,
    pub iterations: usize,
}

impl Default for SelftestConfig {
    fn default() -> Self {
        Self {
            run_id: "selftest".to_string(),
            threads: 4,
            iterations: 500,
        }
    }
}

pub(crate) fn copy_tag(result: &Result<CopyOutcome, NoFaultError>) -> CopyTag {
    match result {
        Ok(CopyOutcome::NoWork) => CopyTag::NoWork,
        Ok(CopyOutcome::Copied(_)) => CopyTag::Copied,
        Ok(CopyOutcome::Truncated(_)) => CopyTag::Truncated,
        Err(_) => CopyTag::Fault,
    }
}

fn run_scenario(scenario: &Scenario) -> Result<ScenarioResult, HarnessError> {
    let region = GuardedRegion::new(1)?;
    let src = match scenario.source {
        Source::AtGuardEdge(bytes) => region.place_at_end(bytes),
        Source::Unreadable => region.unreadable_addr(),
        Source::Null => UntrustedAddr::NULL,
    };
    let capacity = usize::try_from(scenario.limit).unwrap_or(0).max(8);
    let mut dst = vec![POISON; capacity];

    let start = Instant::now();
    let result = copy_string_nofault(&mut dst, src, scenario.limit);
    let latency_ns = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);

    let result_code = legacy_code(&result);
    let dst_ok = match scenario.expected_dst {
        Some(prefix) => dst.starts_with(prefix),
        // A fault may leave partial bytes; only no-work must not write.
        None if result_code == 0 => dst.iter().all(|&b| b == POISON),
        None => true,
    };
    let passed = dst_ok && result_code == scenario.expected_code;
    Ok(ScenarioResult {
        name: scenario.name.to_string(),
        limit: scenario.limit as i64,
        expected_code: scenario.expected_code,
        result_code,
        copy_tag: copy_tag(&result),
        dst_ok,
        passed,
        latency_ns,
    })
}

fn emit(emitter: Option<&Mutex<LogEmitter>>, entry: LogEntry) -> Result<(), HarnessError> {
    if let Some(emitter) = emitter {
        emitter.lock().emit_entry(entry)?;
    }
    Ok(())
}

// Each worker owns a region and a distinct string, and alternates a good copy
// with a faulting one.
fn thread_worker(
    id: usize,
    iterations: usize,
    emitter: Option<&Mutex<LogEmitter>>,
    reader: &str,
) -> Result<(u64, u32), HarnessError> {
    let region = GuardedRegion::new(1)?;
    let text = format!("worker-{id}\0");
    let src = region.place_at_end(text.as_bytes());
    let expected = text.len();
    let mut mismatches = 0_u64;

    for _ in 0..iterations {
        let mut dst = [0_u8; 32];
        match copy_string_nofault(&mut dst, src, 32) {
            Ok(CopyOutcome::Copied(n)) if n == expected && &dst[..n] == text.as_bytes() => {}
            _ => mismatches += 1,
        }
        if copy_string_nofault(&mut dst, region.unreadable_addr(), 32).is_ok() {
            mismatches += 1;
        }
    }

    let level = if mismatches == 0 { LogLevel::Info } else { LogLevel::Error };
    emit(
        emitter,
        LogEntry::new("", level, "thread_done")
            .with_scenario(format!("thread_{id}"))
            .with_symbol("copy_string_nofault")
            .with_reader(reader)
            .with_outcome(if mismatches == 0 { Outcome::Pass } else { Outcome::Fail })
            .with_details(serde_json::json!({
                "iterations": iterations,
                "mismatches": mismatches,
            })),
    )?;
    Ok((mismatches, nofault_depth()))
}

/// Run the scenario matrix and the concurrent phase under the currently
/// configured reader back end.
pub fn run_selftest(
    config: &SelftestConfig,
    emitter: Option<&Mutex<LogEmitter>>,
) -> Result<SelftestReport, HarnessError> {
    let reader = reader_backend();
    let reader_name = reader.as_str();
    let before = global_stats().snapshot();

    emit(
        emitter,
        LogEntry::new("", LogLevel::Info, "selftest_start")
            .with_reader(reader_name)
            .with_details(serde_json::json!({
                "threads": config.threads,
                "iterations": config.iterations,
            })),
    )?;

    let mut results = Vec::new();
    for scenario in scenarios() {
        let result = run_scenario(&scenario)?;
        let (level, outcome) = if result.passed {
            (LogLevel::Info, Outcome::Pass)
        } else {
            (LogLevel::Error, Outcome::Fail)
        };
        let mut entry = LogEntry::new("", level, "scenario_result")
            .with_scenario(scenario.name)
            .with_symbol("copy_string_nofault")
            .with_reader(reader_name)
            .with_call(result.limit, result.result_code, result.copy_tag)
            .with_expected_code(result.expected_code)
            .with_outcome(outcome)
            .with_latency_ns(result.latency_ns);
        if result.result_code < 0 {
            entry = entry.with_errno(EFAULT);
        }
        emit(emitter, entry)?;
        results.push(result);
    }

    let threads = config.threads.max(1);
    let outcomes: Vec<Result<(u64, u32), HarnessError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|id| s.spawn(move || thread_worker(id, config.iterations, emitter, reader_name)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| HarnessError::WorkerPanicked).and_then(|r| r))
            .collect()
    });
    let mut mismatches = 0;
    let mut leaked_depth = 0;
    for outcome in outcomes {
        let (m, depth) = outcome?;
        mismatches += m;
        leaked_depth = leaked_depth.max(depth);
    }

    let stats = StatsDelta::between(before, global_stats().snapshot());
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    let report = SelftestReport {
        run_id: config.run_id.clone(),
        reader: reader_backend_label(reader),
        scenarios: results,
        thread_check: ThreadCheck {
            threads,
            iterations: config.iterations,
            mismatches,
            leaked_depth,
        },
        stats,
        passed,
        failed,
    };

    let level = if report.all_passed() { LogLevel::Info } else { LogLevel::Error };
    emit(
        emitter,
        LogEntry::new("", level, "selftest_done")
            .with_reader(reader_name)
            .with_outcome(if report.all_passed() { Outcome::Pass } else { Outcome::Fail })
            .with_details(serde_json::json!({
                "passed": report.passed,
                "failed": report.failed,
                "thread_mismatches": mismatches,
                "reader_fallbacks": stats.reader_fallbacks,
            })),
    )?;
    if let Some(emitter) = emitter {
        emitter.lock().flush()?;
    }
    Ok(report)
}

// `auto` is reported together with what it resolved to.
fn reader_backend_label(reader: ReaderBackend) -> String {
    if reader == ReaderBackend::Auto && nofault_membrane::config::auto_fell_back() {
        "auto(pipe)".to_string()
    } else {
        reader.as_str().to_string()
    }
}
