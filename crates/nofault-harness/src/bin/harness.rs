//! CLI entrypoint for the nofault harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nofault_harness::structured_log::{ArtifactIndex, LogEmitter, validate_log_file};
use nofault_harness::{SelftestConfig, parse_addr, probe, run_selftest};
use nofault_membrane::{ReaderBackend, set_reader_backend};
use parking_lot::Mutex;

/// Self-test and probe tooling for nofault.
#[derive(Debug, Parser)]
#[command(name = "nofault-harness")]
#[command(about = "Exercise the no-fault string copy against guarded pages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scenario matrix and the concurrent check.
    Selftest {
        /// Structured JSONL log path (if omitted, no log is written).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Reader back end (auto, process_vm, pipe).
        #[arg(long)]
        reader: Option<String>,
        /// Worker threads for the concurrent phase.
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Copies per worker thread.
        #[arg(long, default_value_t = 500)]
        iterations: usize,
        /// Run identifier used in trace ids.
        #[arg(long, default_value = "selftest")]
        run_id: String,
        /// Write an artifact index covering the log.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
    },
    /// Copy the string at an address of this process and print the result.
    Probe {
        /// Address, decimal or 0x-prefixed hex.
        #[arg(long)]
        addr: String,
        /// Copy limit; zero or negative is a no-op.
        #[arg(long, allow_negative_numbers = true)]
        limit: isize,
        /// Reader back end (auto, process_vm, pipe).
        #[arg(long)]
        reader: Option<String>,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        /// Log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn apply_reader(reader: Option<&str>) {
    if let Some(name) = reader {
        let backend = ReaderBackend::from_str_loose(name);
        if backend.as_str() != name.trim().to_ascii_lowercase() {
            eprintln!("note: reader '{name}' treated as '{}'", backend.as_str());
        }
        set_reader_backend(backend);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Selftest {
            log,
            reader,
            threads,
            iterations,
            run_id,
            artifact_index,
        } => {
            apply_reader(reader.as_deref());
            let emitter = match &log {
                Some(path) => Some(Mutex::new(LogEmitter::to_file(path, "selftest", &run_id)?)),
                None => None,
            };
            let config = SelftestConfig {
                run_id: run_id.clone(),
                threads,
                iterations,
            };
            let report = run_selftest(&config, emitter.as_ref())?;
            drop(emitter);

            println!("{}", serde_json::to_string_pretty(&report)?);
            for result in report.scenarios.iter().filter(|r| !r.passed) {
                eprintln!(
                    "FAIL {}: expected {}, got {} (dst ok: {})",
                    result.name, result.expected_code, result.result_code, result.dst_ok
                );
            }

            if let Some(index_path) = artifact_index {
                let mut index = ArtifactIndex::new(&run_id);
                if let Some(log_path) = &log {
                    index.add_file(log_path, "log")?;
                }
                std::fs::write(&index_path, index.to_json()?)?;
                eprintln!("Wrote artifact index to {}", index_path.display());
            }

            eprintln!(
                "selftest: {} passed, {} failed, {} thread mismatches (reader {})",
                report.passed, report.failed, report.thread_check.mismatches, report.reader
            );
            if !report.all_passed() {
                std::process::exit(1);
            }
        }
        Command::Probe {
            addr,
            limit,
            reader,
        } => {
            apply_reader(reader.as_deref());
            let record = probe(parse_addr(&addr)?, limit)?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            eprintln!(
                "{}: {lines} lines, {} errors",
                log.display(),
                errors.len()
            );
            if !errors.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
