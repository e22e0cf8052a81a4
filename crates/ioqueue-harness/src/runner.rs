//! Read and stress runs.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ioqueue_core::errno::errno_name;
use ioqueue_core::platform::O_RDONLY;
use ioqueue_core::{
    Completion, IoQueue, MetricsSnapshot, Platform, PlatformHandle, PosixPlatform, QueueError,
    ReadBuffer, RequestId,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("queue: {0}")]
    Queue(#[from] QueueError),
    #[error("open of '{path}' failed: {name} ({errno})")]
    Open {
        path: String,
        errno: i32,
        name: &'static str,
    },
    #[error("read failed after {bytes} bytes: {name} ({errno})")]
    Read {
        bytes: i64,
        errno: i32,
        name: &'static str,
    },
    #[error("{0} must be positive")]
    ZeroParameter(&'static str),
    #[error("stress worker panicked")]
    WorkerPanicked,
}

/// Inputs of a single read run.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub path: PathBuf,
    pub offset: u64,
    /// Bytes to read; the rest of the file when absent.
    pub length: Option<usize>,
    pub chunk_limit: Option<usize>,
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadReport {
    pub path: String,
    pub offset: u64,
    pub requested: usize,
    pub bytes_read: i64,
    pub chunk_limit: usize,
    pub sha256: String,
    pub elapsed_us: u64,
    pub metrics: MetricsSnapshot,
}

/// Inputs of a stress run.
#[derive(Debug, Clone)]
pub struct StressOptions {
    pub path: PathBuf,
    pub threads: usize,
    pub requests_per_thread: usize,
    pub read_len: usize,
    pub chunk_limit: usize,
    /// Every n-th request carries a deadline; 0 disables deadlines.
    pub deadline_every: usize,
    /// Every n-th request is cancelled right after submission; 0 disables.
    pub cancel_every: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StressReport {
    pub threads: usize,
    pub requests: usize,
    pub bytes_read: u64,
    pub cancelled: usize,
    /// Completed reads whose bytes differ from the file.
    pub mismatches: usize,
    pub elapsed_us: u64,
    pub metrics: MetricsSnapshot,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

fn open_through(queue: &IoQueue, path: &Path) -> Result<PlatformHandle, HarnessError> {
    let id = queue.submit_open(path, O_RDONLY, None)?;
    let completion = queue.wait(id)?;
    completion.handle().ok_or(HarnessError::Open {
        path: path.display().to_string(),
        errno: completion.error,
        name: errno_name(completion.error),
    })
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Read `options.path` through `queue` and hash what arrived.
pub fn run_read(queue: &IoQueue, options: &ReadOptions) -> Result<ReadReport, HarnessError> {
    if let Some(limit) = options.chunk_limit {
        queue.set_read_chunk_limit(limit)?;
    }
    let requested = match options.length {
        Some(length) => length,
        None => {
            let len = std::fs::metadata(&options.path)?.len();
            usize::try_from(len.saturating_sub(options.offset)).unwrap_or(usize::MAX)
        }
    };

    let start = Instant::now();
    let handle = open_through(queue, &options.path)?;
    let buffer = ReadBuffer::zeroed(requested);
    let read = queue
        .submit_read(handle, buffer.clone(), options.offset, options.deadline)
        .and_then(|id| queue.wait(id));
    PosixPlatform.close(handle);
    let completion = read?;
    let elapsed_us = elapsed_us(start);

    if !completion.succeeded() {
        return Err(HarnessError::Read {
            bytes: completion.result,
            errno: completion.error,
            name: errno_name(completion.error),
        });
    }
    let data = buffer.snapshot().unwrap_or_default();
    let got = usize::try_from(completion.result).unwrap_or(0).min(data.len());

    Ok(ReadReport {
        path: options.path.display().to_string(),
        offset: options.offset,
        requested,
        bytes_read: completion.result,
        chunk_limit: queue.read_chunk_limit(),
        sha256: sha256_hex(&data[..got]),
        elapsed_us,
        metrics: queue.metrics(),
    })
}

#[derive(Debug, Default)]
struct ThreadTally {
    bytes_read: u64,
    cancelled: usize,
    mismatches: usize,
}

/// Hammer `queue` from several threads reading the same file at varied
/// offsets, and check every completed read against the file contents.
pub fn run_stress(queue: &IoQueue, options: &StressOptions) -> Result<StressReport, HarnessError> {
    for (name, value) in [
        ("threads", options.threads),
        ("requests", options.requests_per_thread),
        ("read length", options.read_len),
    ] {
        if value == 0 {
            return Err(HarnessError::ZeroParameter(name));
        }
    }
    queue.set_read_chunk_limit(options.chunk_limit)?;
    let expected = std::fs::read(&options.path)?;
    let start = Instant::now();

    let tallies = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..options.threads)
            .map(|thread| {
                let expected = &expected;
                scope.spawn(move || stress_thread(queue, options, expected, thread))
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or(Err(HarnessError::WorkerPanicked)))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut report = StressReport {
        threads: options.threads,
        requests: options.threads * options.requests_per_thread,
        elapsed_us: elapsed_us(start),
        metrics: queue.metrics(),
        ..StressReport::default()
    };
    for tally in tallies {
        report.bytes_read += tally.bytes_read;
        report.cancelled += tally.cancelled;
        report.mismatches += tally.mismatches;
    }
    Ok(report)
}

fn stress_thread(
    queue: &IoQueue,
    options: &StressOptions,
    expected: &[u8],
    thread: usize,
) -> Result<ThreadTally, HarnessError> {
    let handle = open_through(queue, &options.path)?;
    let span = expected.len().max(1);

    let mut submitted: Vec<(RequestId, ReadBuffer, usize)> = Vec::new();
    let mut outcome = Ok(());
    for n in 0..options.requests_per_thread {
        let seq = thread * options.requests_per_thread + n;
        let offset = (seq * 7919) % span;
        let deadline = (options.deadline_every != 0 && seq % options.deadline_every == 0)
            .then(|| Duration::from_millis((seq % 5) as u64));
        let buffer = ReadBuffer::zeroed(options.read_len);
        match queue.submit_read(handle, buffer.clone(), offset as u64, deadline) {
            Ok(id) => {
                if options.cancel_every != 0 && seq % options.cancel_every == 0 {
                    queue.cancel(id)?;
                }
                submitted.push((id, buffer, offset));
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    let mut tally = ThreadTally::default();
    for (id, buffer, offset) in submitted {
        let completion = queue.wait(id)?;
        tally_completion(&mut tally, completion, &buffer, &expected[offset.min(expected.len())..]);
    }
    PosixPlatform.close(handle);
    outcome?;
    Ok(tally)
}

fn tally_completion(tally: &mut ThreadTally, completion: Completion, buffer: &ReadBuffer, file_tail: &[u8]) {
    if completion.was_cancelled() {
        tally.cancelled += 1;
        return;
    }
    let data = buffer.snapshot().unwrap_or_default();
    let want = data.len().min(file_tail.len());
    let got = usize::try_from(completion.result).unwrap_or(usize::MAX);
    if !completion.succeeded() || got != want || data[..want] != file_tail[..want] {
        tally.mismatches += 1;
        return;
    }
    tally.bytes_read += got as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn tally_counts_cancellations_and_mismatches() {
        let mut tally = ThreadTally::default();
        let buffer = ReadBuffer::from_vec(b"hel".to_vec());

        tally_completion(&mut tally, Completion { result: 3, error: 0 }, &buffer, b"hello");
        assert_eq!(tally.bytes_read, 3);

        tally_completion(&mut tally, Completion { result: 3, error: 0 }, &buffer, b"help!");
        assert_eq!(tally.mismatches, 1);

        let cancelled = Completion {
            result: -1,
            error: ioqueue_core::errno::ECANCELED,
        };
        tally_completion(&mut tally, cancelled, &buffer, b"hello");
        assert_eq!(tally.cancelled, 1);
    }

    #[test]
    fn short_tail_expects_short_read() {
        let mut tally = ThreadTally::default();
        let buffer = ReadBuffer::from_vec(b"lo\0\0".to_vec());
        tally_completion(&mut tally, Completion { result: 2, error: 0 }, &buffer, b"lo");
        assert_eq!(tally.mismatches, 0);
        assert_eq!(tally.bytes_read, 2);
    }
}
