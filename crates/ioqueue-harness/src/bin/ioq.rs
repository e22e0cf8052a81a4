//! CLI entrypoint for the ioqueue harness.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ioqueue_core::{IoQueue, QueueConfig};
use ioqueue_harness::{ReadOptions, StressOptions, check_log, run_read, run_stress};
use serde::Serialize;

/// Drive the ioqueue against real files.
#[derive(Debug, Parser)]
#[command(name = "ioq")]
#[command(about = "Exercise the deadline-aware I/O queue and report as JSON")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read one file through the queue and report its hash.
    Read {
        /// File to read.
        #[arg(long)]
        path: PathBuf,
        /// Starting offset in bytes.
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Bytes to read (default: to end of file).
        #[arg(long)]
        length: Option<usize>,
        /// Largest single read syscall, in bytes.
        #[arg(long)]
        chunk_limit: Option<usize>,
        /// Soft deadline in milliseconds.
        #[arg(long)]
        deadline_ms: Option<u64>,
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run concurrent readers over one file and check every byte.
    Stress {
        /// File to read.
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Requests submitted by each thread.
        #[arg(long, default_value_t = 64)]
        requests: usize,
        /// Bytes per request.
        #[arg(long, default_value_t = 4096)]
        read_len: usize,
        #[arg(long, default_value_t = 1024)]
        chunk_limit: usize,
        /// Give every n-th request a deadline (0 = never).
        #[arg(long, default_value_t = 3)]
        deadline_every: usize,
        /// Cancel every n-th request (0 = never).
        #[arg(long, default_value_t = 0)]
        cancel_every: usize,
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a structured JSONL queue log.
    ValidateLog {
        /// Log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn emit<T: Serialize>(report: &T, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json + "\n")?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let queue = IoQueue::with_config(QueueConfig::from_env());

    match cli.command {
        Command::Read {
            path,
            offset,
            length,
            chunk_limit,
            deadline_ms,
            output,
        } => {
            let options = ReadOptions {
                path,
                offset,
                length,
                chunk_limit,
                deadline: deadline_ms.map(Duration::from_millis),
            };
            let report = run_read(&queue, &options)?;
            emit(&report, output)?;
        }
        Command::Stress {
            path,
            threads,
            requests,
            read_len,
            chunk_limit,
            deadline_every,
            cancel_every,
            output,
        } => {
            let options = StressOptions {
                path,
                threads,
                requests_per_thread: requests,
                read_len,
                chunk_limit,
                deadline_every,
                cancel_every,
            };
            let report = run_stress(&queue, &options)?;
            let mismatches = report.mismatches;
            emit(&report, output)?;
            if mismatches > 0 {
                return Err(format!("{mismatches} reads returned wrong data").into());
            }
        }
        Command::ValidateLog { log } => {
            let report = check_log(&log)?;
            emit(&report, None)?;
            if !report.is_clean() {
                return Err(format!("{} invalid log lines", report.errors.len()).into());
            }
        }
    }

    Ok(())
}
