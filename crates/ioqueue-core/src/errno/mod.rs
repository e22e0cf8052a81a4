//! Error number definitions.
//!
//! Linux errno values used by the queue, plus thread-local errno storage for
//! callers that consume the sentinel-and-errno surface.

use std::cell::Cell;

thread_local! {
    static ERRNO: Cell<i32> = const { Cell::new(0) };
}

pub const EPERM: i32 = 1;
pub const ENOENT: i32 = 2;
/// Reported for request ids that do not name a live request.
pub const ESRCH: i32 = 3;
pub const EINTR: i32 = 4;
pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EACCES: i32 = 13;
pub const EFAULT: i32 = 14;
pub const EBUSY: i32 = 16;
pub const EISDIR: i32 = 21;
pub const EINVAL: i32 = 22;
pub const EMFILE: i32 = 24;
pub const ENOSYS: i32 = 38;
pub const EOVERFLOW: i32 = 75;
/// Operation aborted; the outcome of every cancelled request.
pub const ECANCELED: i32 = 125;

/// Returns the current thread-local errno value.
pub fn get_errno() -> i32 {
    ERRNO.get()
}

/// Sets the current thread-local errno value.
pub fn set_errno(value: i32) {
    ERRNO.set(value);
}

/// Address of the calling thread's errno, for C callers that read it
/// through a pointer. Valid for the lifetime of the thread.
#[must_use]
pub fn errno_location() -> *mut i32 {
    ERRNO.with(Cell::as_ptr)
}

/// Short symbolic name for the errno values this crate produces.
#[must_use]
pub const fn errno_name(value: i32) -> &'static str {
    match value {
        0 => "OK",
        EPERM => "EPERM",
        ENOENT => "ENOENT",
        ESRCH => "ESRCH",
        EINTR => "EINTR",
        EIO => "EIO",
        EBADF => "EBADF",
        EAGAIN => "EAGAIN",
        ENOMEM => "ENOMEM",
        EACCES => "EACCES",
        EFAULT => "EFAULT",
        EBUSY => "EBUSY",
        EISDIR => "EISDIR",
        EINVAL => "EINVAL",
        EMFILE => "EMFILE",
        ENOSYS => "ENOSYS",
        EOVERFLOW => "EOVERFLOW",
        ECANCELED => "ECANCELED",
        _ => "E?",
    }
}
