//! Harness for the ioqueue.
//!
//! This crate provides:
//! - Read runs: one file read through the queue, with chunk limit and deadline
//! - Stress runs: many threads mixing deadlines and cancellation over one file
//! - Log checks: validate a JSONL queue log
//!
//! Every run produces a serializable report for the `ioq` binary to print.

#![forbid(unsafe_code)]

pub mod log_check;
pub mod runner;

pub use log_check::{LogCheckReport, check_log};
pub use runner::{
    HarnessError, ReadOptions, ReadReport, StressOptions, StressReport, run_read, run_stress,
};
