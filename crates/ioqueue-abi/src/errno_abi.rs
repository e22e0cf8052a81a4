//! ABI layer for the queue's thread-local errno.

use std::ffi::c_int;

use ioqueue_core::errno;

/// Pointer to the calling thread's errno.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_errno_location() -> *mut c_int {
    errno::errno_location()
}

/// The calling thread's errno.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ioqueue_errno() -> c_int {
    errno::get_errno()
}

#[inline]
pub(crate) fn set_abi_errno(val: c_int) {
    errno::set_errno(val);
}
