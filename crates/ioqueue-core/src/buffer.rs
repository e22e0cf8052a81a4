//! Read destinations.
//!
//! A [`ReadBuffer`] is where a read request deposits its bytes. The worker
//! fills it chunk by chunk without holding the table lock, so the buffer is
//! reachable through its own handle rather than through the request table.
//!
//! Two flavors exist:
//! - shared: an owned `Vec<u8>` behind a `parking_lot::Mutex`; the caller may
//!   [`snapshot`](ReadBuffer::snapshot) it while the request is in flight.
//! - raw: caller-owned memory handed over as a pointer/length pair, used by
//!   the C surface. The caller keeps it alive and untouched until `wait`.

use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errno;

#[derive(Clone)]
enum Storage {
    Shared(Arc<Mutex<Vec<u8>>>),
    Raw(RawWindow),
}

#[derive(Clone, Copy)]
struct RawWindow {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the window is only dereferenced by the single worker executing the
// owning request; the `from_raw_parts` contract makes the caller guarantee the
// memory stays valid and unaliased until the request is waited on.
unsafe impl Send for RawWindow {}
// SAFETY: see `Send`; shared references never dereference the pointer.
unsafe impl Sync for RawWindow {}

/// Destination memory for a read request.
#[derive(Clone)]
pub struct ReadBuffer {
    storage: Storage,
}

impl std::fmt::Debug for ReadBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.storage {
            Storage::Shared(_) => "shared",
            Storage::Raw(_) => "raw",
        };
        f.debug_struct("ReadBuffer")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

impl ReadBuffer {
    /// A shared buffer of `len` zero bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![0_u8; len])
    }

    /// A shared buffer taking ownership of `bytes`.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            storage: Storage::Shared(Arc::new(Mutex::new(bytes))),
        }
    }

    /// Wrap caller-owned memory. Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `len` bytes, and the region must not
    /// be read, written or freed by anyone else until the request using this
    /// buffer has been waited on (or the queue has been reset).
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            storage: Storage::Raw(RawWindow { ptr, len }),
        })
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Shared(bytes) => bytes.lock().len(),
            Storage::Raw(window) => window.len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents. `None` for raw buffers: their memory
    /// belongs to the caller, who reads it directly after `wait`.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        match &self.storage {
            Storage::Shared(bytes) => Some(bytes.lock().clone()),
            Storage::Raw(_) => None,
        }
    }

    /// Run `fill` over `[start, start + len)`. Out-of-range windows fail
    /// with `EFAULT` without calling `fill`.
    pub(crate) fn fill_window<F>(&self, start: usize, len: usize, fill: F) -> Result<usize, i32>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, i32>,
    {
        let end = start.checked_add(len).ok_or(errno::EFAULT)?;
        match &self.storage {
            Storage::Shared(bytes) => {
                let mut bytes = bytes.lock();
                let window = bytes.get_mut(start..end).ok_or(errno::EFAULT)?;
                fill(window)
            }
            Storage::Raw(window) => {
                if end > window.len {
                    return Err(errno::EFAULT);
                }
                // SAFETY: `from_raw_parts` guarantees `ptr..ptr+len` is valid and
                // exclusively ours while the request is live; the range was
                // checked above.
                let slice = unsafe {
                    std::slice::from_raw_parts_mut(window.ptr.as_ptr().add(start), len)
                };
                fill(slice)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_window_fill_is_visible_in_snapshot() {
        let buf = ReadBuffer::zeroed(5);
        let n = buf
            .fill_window(1, 2, |w| {
                w.copy_from_slice(b"ab");
                Ok(2)
            })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf.snapshot().unwrap(), b"\0ab\0\0");
    }

    #[test]
    fn clones_share_storage() {
        let buf = ReadBuffer::zeroed(2);
        let clone = buf.clone();
        clone
            .fill_window(0, 2, |w| {
                w.copy_from_slice(b"hi");
                Ok(2)
            })
            .unwrap();
        assert_eq!(buf.snapshot().unwrap(), b"hi");
    }

    #[test]
    fn out_of_range_window_is_efault() {
        let buf = ReadBuffer::zeroed(4);
        let called = std::cell::Cell::new(false);
        let rc = buf.fill_window(3, 2, |_| {
            called.set(true);
            Ok(0)
        });
        assert_eq!(rc, Err(errno::EFAULT));
        assert!(!called.get());
        assert_eq!(buf.fill_window(usize::MAX, 2, |_| Ok(0)), Err(errno::EFAULT));
    }

    #[test]
    fn raw_window_writes_through_to_caller_memory() {
        let mut backing = [0_u8; 4];
        // SAFETY: `backing` outlives `buf` and is not touched until the fill ends.
        let buf = unsafe { ReadBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) }
            .unwrap();
        assert_eq!(buf.len(), 4);
        assert!(buf.snapshot().is_none());
        buf.fill_window(2, 2, |w| {
            w.copy_from_slice(b"ok");
            Ok(2)
        })
        .unwrap();
        drop(buf);
        assert_eq!(&backing, b"\0\0ok");
    }

    #[test]
    fn null_raw_pointer_is_rejected() {
        // SAFETY: a null pointer is rejected before any dereference.
        assert!(unsafe { ReadBuffer::from_raw_parts(std::ptr::null_mut(), 8) }.is_none());
    }
}
