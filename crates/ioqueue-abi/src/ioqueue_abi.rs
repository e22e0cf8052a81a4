//! ABI layer for the request queue: submit, poll, wait, cancel, tune, reset.
//!
//! Requests are named by their raw `u64` id; 0 is never a valid id and is
//! what failed submissions return.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::sync::OnceLock;
use std::time::Duration;

use ioqueue_core::errno;
use ioqueue_core::{IoQueue, PlatformHandle, QueueConfig, QueueError, ReadBuffer, RequestId};

use crate::errno_abi::set_abi_errno;

static QUEUE: OnceLock<IoQueue> = OnceLock::new();

/// The process-wide queue, configured from `IOQUEUE_*` variables.
pub fn default_queue() -> &'static IoQueue {
    QUEUE.get_or_init(|| IoQueue::with_config(QueueConfig::from_env()))
}

/// Negative, NaN or infinite seconds mean "no deadline". Finite values too
/// large for a `Duration` saturate, so they still outrank no deadline.
fn deadline_from_seconds(seconds: f64) -> Option<Duration> {
    if seconds >= 0.0 && seconds.is_finite() {
        Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

fn submitted(outcome: Result<RequestId, QueueError>) -> u64 {
    match outcome {
        Ok(id) => id.as_raw(),
        Err(e) => {
            set_abi_errno(e.errno());
            0
        }
    }
}

fn request_id(raw: u64) -> Result<RequestId, QueueError> {
    RequestId::from_raw(raw).ok_or(QueueError::NoSuchRequest)
}

// ---------------------------------------------------------------------------
// lifecycle
// ---------------------------------------------------------------------------

/// Arm the queue. Required again after `ioqueue_reset`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_init() -> c_int {
    default_queue().init();
    0
}

/// Stop the worker and drop every request. Safe before any init.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_reset() {
    if let Some(queue) = QUEUE.get() {
        queue.reset();
    }
}

// ---------------------------------------------------------------------------
// submission
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_submit_open(
    path: *const c_char,
    flags: c_int,
    deadline_seconds: f64,
) -> u64 {
    if path.is_null() {
        set_abi_errno(errno::EINVAL);
        return 0;
    }
    // SAFETY: non-null, and the caller passes a NUL-terminated string.
    let path = unsafe { CStr::from_ptr(path) };
    submitted(default_queue().submit_open_cstr(
        path,
        flags,
        deadline_from_seconds(deadline_seconds),
    ))
}

/// Queue a read of `count` bytes at `offset` into `buffer`.
///
/// `buffer` must stay valid and untouched until the request is waited on.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_submit_read(
    handle: i64,
    buffer: *mut c_void,
    count: i64,
    offset: i64,
    deadline_seconds: f64,
) -> u64 {
    let (Ok(count), Ok(offset)) = (usize::try_from(count), u64::try_from(offset)) else {
        set_abi_errno(errno::EINVAL);
        return 0;
    };
    // SAFETY: the caller hands over `count` writable bytes until wait.
    let Some(buffer) = (unsafe { ReadBuffer::from_raw_parts(buffer.cast::<u8>(), count) }) else {
        set_abi_errno(errno::EINVAL);
        return 0;
    };
    submitted(default_queue().submit_read(
        PlatformHandle::from_raw(handle),
        buffer,
        offset,
        deadline_from_seconds(deadline_seconds),
    ))
}

// ---------------------------------------------------------------------------
// completion
// ---------------------------------------------------------------------------

/// 1 when complete. Unknown ids also return 1, with errno `ESRCH`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_poll(id: u64) -> c_int {
    match request_id(id).and_then(|id| default_queue().try_poll(id)) {
        Ok(done) => c_int::from(done),
        Err(e) => {
            set_abi_errno(e.errno());
            1
        }
    }
}

/// Block until complete, release the request and return its result.
///
/// `*out_error` receives the operation's errno, or 0 for an unknown id
/// (which returns -1 with errno `ESRCH`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_wait(id: u64, out_error: *mut c_int) -> i64 {
    let (result, error) = match request_id(id).and_then(|id| default_queue().wait(id)) {
        Ok(completion) => {
            if completion.result < 0 {
                set_abi_errno(completion.error);
            }
            (completion.result, completion.error)
        }
        Err(e) => {
            set_abi_errno(e.errno());
            (-1, 0)
        }
    };
    if !out_error.is_null() {
        // SAFETY: non-null out-pointer supplied by the caller.
        unsafe { *out_error = error };
    }
    result
}

// ---------------------------------------------------------------------------
// cancellation
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_cancel(id: u64) {
    if let Err(e) = request_id(id).and_then(|id| default_queue().cancel(id)) {
        set_abi_errno(e.errno());
    }
}

/// Returns the number of reads cancelled.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_cancel_all_for_handle(handle: i64) -> c_int {
    let cancelled = default_queue().cancel_all_for_handle(PlatformHandle::from_raw(handle));
    c_int::try_from(cancelled).unwrap_or(c_int::MAX)
}

// ---------------------------------------------------------------------------
// tuning
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_set_read_chunk_limit(bytes: i64) -> c_int {
    let limit = usize::try_from(bytes).map_err(|_| QueueError::InvalidArgument("negative limit"));
    match limit.and_then(|limit| default_queue().set_read_chunk_limit(limit)) {
        Ok(()) => 0,
        Err(e) => {
            set_abi_errno(e.errno());
            -1
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_read_chunk_limit() -> i64 {
    i64::try_from(default_queue().read_chunk_limit()).unwrap_or(i64::MAX)
}
