//! Typed errors of the queue API.
//!
//! Syscall failures and cancellation are not errors here: they are request
//! outcomes, delivered through [`Completion`](crate::Completion).

use crate::errno;

/// Failure of a queue operation itself (as opposed to the I/O it carries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("out of memory allocating a request slot")]
    OutOfMemory,
    #[error("transient submission failure, retry")]
    Transient,
    #[error("no such request")]
    NoSuchRequest,
    #[error("queue is not initialized")]
    NotInitialized,
}

impl QueueError {
    /// POSIX error number reported for this failure.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::NotInitialized => errno::EINVAL,
            Self::OutOfMemory => errno::ENOMEM,
            Self::Transient => errno::EAGAIN,
            Self::NoSuchRequest => errno::ESRCH,
        }
    }
}
