//! Split reads: one bounded chunk per dispatch.

use crate::buffer::ReadBuffer;
use crate::errno;
use crate::platform::{Platform, PlatformHandle};

/// Private copy of a read request, worked on without the table lock.
#[derive(Debug, Clone)]
pub(crate) struct ReadJob {
    pub handle: PlatformHandle,
    pub buffer: ReadBuffer,
    pub buffer_offset: usize,
    pub remaining: usize,
    pub position: u64,
    /// Bytes delivered by earlier chunks.
    pub accumulated: i64,
    pub limit: usize,
    /// Fail this chunk with `EIO` without touching the file.
    pub inject_failure: bool,
}

/// Where a read stands after one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkOutcome {
    /// A full chunk arrived and more is wanted.
    Continue {
        buffer_offset: usize,
        remaining: usize,
        position: u64,
        accumulated: i64,
    },
    Complete { result: i64, error: i32 },
}

/// Issue one read of at most `limit` bytes.
///
/// A full chunk with bytes left over continues; a short chunk or an empty
/// remainder completes with the running total. A failure keeps the total
/// when earlier chunks delivered anything and reports -1 otherwise.
pub(crate) fn run_chunk(platform: &dyn Platform, job: &ReadJob) -> ChunkOutcome {
    let want = job.remaining.min(job.limit);
    let read = if job.inject_failure {
        Err(errno::EIO)
    } else {
        job.buffer.fill_window(job.buffer_offset, want, |window| {
            platform.pread(job.handle, window, job.position)
        })
    };

    match read {
        Err(error) => ChunkOutcome::Complete {
            result: if job.accumulated > 0 { job.accumulated } else { -1 },
            error,
        },
        Ok(got) => {
            let accumulated = job.accumulated.saturating_add(got as i64);
            let remaining = job.remaining - got.min(job.remaining);
            if got == want && remaining > 0 {
                ChunkOutcome::Continue {
                    buffer_offset: job.buffer_offset + got,
                    remaining,
                    position: job.position + got as u64,
                    accumulated,
                }
            } else {
                ChunkOutcome::Complete {
                    result: accumulated,
                    error: 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    /// Serves reads from an in-memory file.
    struct MemFile(&'static [u8]);

    impl Platform for MemFile {
        fn open(&self, _path: &CStr, _flags: i32) -> Result<PlatformHandle, i32> {
            Ok(PlatformHandle::from_raw(3))
        }

        fn pread(&self, _h: PlatformHandle, buf: &mut [u8], offset: u64) -> Result<usize, i32> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn close(&self, _handle: PlatformHandle) {}

        fn now_ticks(&self) -> u64 {
            0
        }

        fn ticks_per_second(&self) -> u64 {
            1
        }
    }

    fn job(buffer: &ReadBuffer, remaining: usize, limit: usize) -> ReadJob {
        ReadJob {
            handle: PlatformHandle::from_raw(3),
            buffer: buffer.clone(),
            buffer_offset: 0,
            remaining,
            position: 0,
            accumulated: 0,
            limit,
            inject_failure: false,
        }
    }

    fn advance(job: &mut ReadJob, outcome: ChunkOutcome) {
        let ChunkOutcome::Continue {
            buffer_offset,
            remaining,
            position,
            accumulated,
        } = outcome
        else {
            panic!("expected continuation, got {outcome:?}");
        };
        job.buffer_offset = buffer_offset;
        job.remaining = remaining;
        job.position = position;
        job.accumulated = accumulated;
    }

    #[test]
    fn read_within_limit_completes_at_once() {
        let buffer = ReadBuffer::zeroed(5);
        let outcome = run_chunk(&MemFile(b"hello"), &job(&buffer, 5, 16));
        assert_eq!(outcome, ChunkOutcome::Complete { result: 5, error: 0 });
        assert_eq!(buffer.snapshot().unwrap(), b"hello");
    }

    #[test]
    fn large_read_is_chunked() {
        let file = MemFile(b"hello");
        let buffer = ReadBuffer::zeroed(5);
        let mut job = job(&buffer, 5, 2);

        let first = run_chunk(&file, &job);
        assert_eq!(buffer.snapshot().unwrap(), b"he\0\0\0");
        advance(&mut job, first);
        assert_eq!((job.remaining, job.position, job.accumulated), (3, 2, 2));

        let second = run_chunk(&file, &job);
        assert_eq!(buffer.snapshot().unwrap(), b"hell\0");
        advance(&mut job, second);

        let last = run_chunk(&file, &job);
        assert_eq!(last, ChunkOutcome::Complete { result: 5, error: 0 });
        assert_eq!(buffer.snapshot().unwrap(), b"hello");
    }

    #[test]
    fn short_read_completes_early() {
        let buffer = ReadBuffer::zeroed(8);
        let outcome = run_chunk(&MemFile(b"abc"), &job(&buffer, 8, 4));
        assert_eq!(outcome, ChunkOutcome::Complete { result: 3, error: 0 });
    }

    #[test]
    fn first_chunk_failure_reports_minus_one() {
        let buffer = ReadBuffer::zeroed(5);
        let mut job = job(&buffer, 5, 2);
        job.inject_failure = true;
        assert_eq!(
            run_chunk(&MemFile(b"hello"), &job),
            ChunkOutcome::Complete {
                result: -1,
                error: errno::EIO
            }
        );
        assert_eq!(buffer.snapshot().unwrap(), b"\0\0\0\0\0");
    }

    #[test]
    fn later_failure_keeps_partial_count() {
        let file = MemFile(b"hello");
        let buffer = ReadBuffer::zeroed(5);
        let mut job = job(&buffer, 5, 2);
        let first = run_chunk(&file, &job);
        advance(&mut job, first);
        job.inject_failure = true;
        assert_eq!(
            run_chunk(&file, &job),
            ChunkOutcome::Complete {
                result: 2,
                error: errno::EIO
            }
        );
        assert_eq!(buffer.snapshot().unwrap(), b"he\0\0\0");
    }

    #[test]
    fn zero_length_read_completes_with_zero() {
        let buffer = ReadBuffer::zeroed(0);
        let outcome = run_chunk(&MemFile(b"hello"), &job(&buffer, 0, 2));
        assert_eq!(outcome, ChunkOutcome::Complete { result: 0, error: 0 });
    }
}
