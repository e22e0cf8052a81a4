//! libc-backed [`Platform`]: `open`, `pread`, `close`, `CLOCK_MONOTONIC`.

use std::ffi::CStr;

use super::{NANOS_PER_SECOND, Platform, PlatformHandle};
use crate::errno;

/// The default platform, calling straight into libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixPlatform;

fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(errno::EIO)
}

fn raw_fd(handle: PlatformHandle) -> Result<libc::c_int, i32> {
    libc::c_int::try_from(handle.as_raw()).map_err(|_| errno::EBADF)
}

impl Platform for PosixPlatform {
    fn open(&self, path: &CStr, flags: i32) -> Result<PlatformHandle, i32> {
        // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
        let fd = unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC) };
        if fd < 0 {
            Err(last_errno())
        } else {
            Ok(PlatformHandle::from_raw(i64::from(fd)))
        }
    }

    fn pread(&self, handle: PlatformHandle, buf: &mut [u8], offset: u64) -> Result<usize, i32> {
        let fd = raw_fd(handle)?;
        let offset = libc::off_t::try_from(offset).map_err(|_| errno::EOVERFLOW)?;
        loop {
            // SAFETY: `buf` is an exclusive, writable slice of `buf.len()` bytes.
            let rc = unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), buf.len(), offset) };
            if rc >= 0 {
                return Ok(rc as usize);
            }
            let err = last_errno();
            if err != errno::EINTR {
                return Err(err);
            }
        }
    }

    fn close(&self, handle: PlatformHandle) {
        if let Ok(fd) = raw_fd(handle) {
            // SAFETY: closing an fd is memory-safe; a stale value only yields EBADF.
            unsafe { libc::close(fd) };
        }
    }

    fn now_ticks(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if rc != 0 {
            return 0;
        }
        (ts.tv_sec as u64)
            .wrapping_mul(NANOS_PER_SECOND)
            .wrapping_add(ts.tv_nsec as u64)
    }

    fn ticks_per_second(&self) -> u64 {
        NANOS_PER_SECOND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::io::Write;

    fn temp_file(tag: &str, contents: &[u8]) -> CString {
        let path = std::env::temp_dir().join(format!(
            "ioqueue-posix-{tag}-{}.bin",
            std::process::id()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        CString::new(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn open_pread_close_roundtrip() {
        let path = temp_file("roundtrip", b"hello world");
        let platform = PosixPlatform;
        let handle = platform.open(&path, libc::O_RDONLY).unwrap();
        let mut buf = [0_u8; 5];
        assert_eq!(platform.pread(handle, &mut buf, 6).unwrap(), 5);
        assert_eq!(&buf, b"world");
        // Positioned reads do not move a cursor.
        assert_eq!(platform.pread(handle, &mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        platform.close(handle);
    }

    #[test]
    fn pread_past_eof_returns_zero() {
        let path = temp_file("eof", b"abc");
        let platform = PosixPlatform;
        let handle = platform.open(&path, libc::O_RDONLY).unwrap();
        let mut buf = [0_u8; 4];
        assert_eq!(platform.pread(handle, &mut buf, 10).unwrap(), 0);
        platform.close(handle);
    }

    #[test]
    fn open_missing_file_reports_enoent() {
        let path = CString::new("/nonexistent/ioqueue/missing").unwrap();
        assert_eq!(
            PosixPlatform.open(&path, libc::O_RDONLY),
            Err(errno::ENOENT)
        );
    }

    #[test]
    fn pread_on_bad_handle_reports_ebadf() {
        let mut buf = [0_u8; 1];
        assert_eq!(
            PosixPlatform.pread(PlatformHandle::from_raw(i64::MAX), &mut buf, 0),
            Err(errno::EBADF)
        );
    }

    #[test]
    fn monotonic_clock_advances() {
        let a = PosixPlatform.now_ticks();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = PosixPlatform.now_ticks();
        assert!(b > a);
        assert_eq!(PosixPlatform.ticks_per_second(), NANOS_PER_SECOND);
    }
}
