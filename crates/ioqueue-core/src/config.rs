//! Queue configuration.
//!
//! Defaults can be overridden from the environment:
//! - `IOQUEUE_READ_LIMIT`: largest single read syscall, in bytes. Accepts a
//!   plain integer or a `k`/`m` suffix (`64k`, `1m`). Zero or garbage keeps
//!   the default.
//! - `IOQUEUE_LOG`: `stderr` (default), `off`, or a file path for JSONL logs.

use std::path::PathBuf;

/// Default cap on the length of one read syscall (1 MiB).
pub const DEFAULT_READ_LIMIT: usize = 1_048_576;

/// Unused slots kept above the highest live slot when the table shrinks.
pub const DEFAULT_SHRINK_SLACK: usize = 4;

/// Thread name for the background worker.
pub const DEFAULT_WORKER_NAME: &str = "ioqueue-worker";

/// Where structured log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    #[default]
    Stderr,
    Off,
    File(PathBuf),
}

impl LogTarget {
    /// Parse an `IOQUEUE_LOG` value.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "stderr" | "default" => Self::Stderr,
            "off" | "none" | "0" => Self::Off,
            _ => Self::File(PathBuf::from(trimmed)),
        }
    }
}

/// Tunables for one [`IoQueue`](crate::IoQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Largest length requested from a single read syscall.
    pub read_limit: usize,
    /// Slack slots retained when the request table shrinks.
    pub shrink_slack: usize,
    /// Name given to the worker thread.
    pub worker_name: String,
    /// Structured log destination.
    pub log: LogTarget,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            read_limit: DEFAULT_READ_LIMIT,
            shrink_slack: DEFAULT_SHRINK_SLACK,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            log: LogTarget::Stderr,
        }
    }
}

impl QueueConfig {
    /// Defaults overlaid with `IOQUEUE_READ_LIMIT` / `IOQUEUE_LOG`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable variable source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(limit) = lookup("IOQUEUE_READ_LIMIT").and_then(|v| parse_byte_count(&v)) {
            config.read_limit = limit;
        }
        if let Some(log) = lookup("IOQUEUE_LOG") {
            config.log = LogTarget::from_str_loose(&log);
        }
        config
    }
}

/// Parse a positive byte count with an optional `k`/`m` (binary) suffix.
#[must_use]
pub fn parse_byte_count(raw: &str) -> Option<usize> {
    let s = raw.trim().to_ascii_lowercase();
    let (digits, scale) = if let Some(d) = s.strip_suffix('k') {
        (d, 1024)
    } else if let Some(d) = s.strip_suffix('m') {
        (d, 1024 * 1024)
    } else {
        (s.as_str(), 1)
    };
    let n: usize = digits.trim().parse().ok()?;
    n.checked_mul(scale).filter(|&v| v > 0)
}
