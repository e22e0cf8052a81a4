//! Platform primitives consumed by the queue.
//!
//! The queue never calls the OS directly: opening, positioned reads, closing
//! and the monotonic clock all go through [`Platform`]. [`PosixPlatform`] is
//! the libc-backed implementation; tests substitute instrumented ones.

use std::ffi::CStr;

#[allow(unsafe_code)]
mod posix;

pub use posix::PosixPlatform;

// ---------------------------------------------------------------------------
// Open flag constants (Linux values)
// ---------------------------------------------------------------------------

/// Open for reading only.
pub const O_RDONLY: i32 = 0;
/// Open for writing only.
pub const O_WRONLY: i32 = 0o1;
/// Open for reading and writing.
pub const O_RDWR: i32 = 0o2;
/// Mask for the access mode bits.
pub const O_ACCMODE: i32 = 0o3;
/// Create the file if it does not exist.
pub const O_CREAT: i32 = 0o100;
/// Truncate to zero length.
pub const O_TRUNC: i32 = 0o1000;
/// Append on each write.
pub const O_APPEND: i32 = 0o2000;

/// Returns true if `flags` ask for any form of write access.
///
/// The queue only services reads, so these opens are rejected at submission.
#[must_use]
pub const fn open_flags_request_write(flags: i32) -> bool {
    (flags & O_ACCMODE) != O_RDONLY || (flags & (O_CREAT | O_TRUNC | O_APPEND)) != 0
}

/// Nanosecond ticks, the unit of [`PosixPlatform::now_ticks`].
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Numeric representation of an opened platform file handle.
///
/// For POSIX this is the file descriptor widened to `i64`; it is also the
/// value a completed open request reports as its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformHandle(i64);

impl PlatformHandle {
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_raw(self) -> i64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Platform seam
// ---------------------------------------------------------------------------

/// Blocking primitives the worker thread executes outside the table lock.
///
/// Errors are raw errno values and are surfaced to callers verbatim.
pub trait Platform: Send + Sync {
    /// Open `path` with `flags`, returning the new handle.
    fn open(&self, path: &CStr, flags: i32) -> Result<PlatformHandle, i32>;

    /// Read up to `buf.len()` bytes at absolute `offset` without moving any
    /// file cursor. Returns the number of bytes transferred (0 at EOF).
    fn pread(&self, handle: PlatformHandle, buf: &mut [u8], offset: u64) -> Result<usize, i32>;

    /// Release a handle produced by [`Platform::open`].
    fn close(&self, handle: PlatformHandle);

    /// Current monotonic clock reading.
    fn now_ticks(&self) -> u64;

    /// Conversion constant for [`Platform::now_ticks`].
    fn ticks_per_second(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_flags_are_accepted() {
        assert!(!open_flags_request_write(O_RDONLY));
        assert!(!open_flags_request_write(O_RDONLY | 0o4000));
    }

    #[test]
    fn write_class_flags_are_rejected() {
        assert!(open_flags_request_write(O_WRONLY));
        assert!(open_flags_request_write(O_RDWR));
        assert!(open_flags_request_write(O_RDONLY | O_CREAT));
        assert!(open_flags_request_write(O_RDONLY | O_TRUNC));
        assert!(open_flags_request_write(O_RDONLY | O_APPEND));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn flag_values_match_linux() {
        assert_eq!(O_WRONLY, libc::O_WRONLY);
        assert_eq!(O_RDWR, libc::O_RDWR);
        assert_eq!(O_CREAT, libc::O_CREAT);
        assert_eq!(O_TRUNC, libc::O_TRUNC);
        assert_eq!(O_APPEND, libc::O_APPEND);
    }

    #[test]
    fn handle_roundtrips_raw_value() {
        assert_eq!(PlatformHandle::from_raw(7).as_raw(), 7);
    }
}
