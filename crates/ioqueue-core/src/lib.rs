//! # ioqueue-core
//!
//! A deadline-aware background request queue that gives blocking file
//! open/read syscalls a non-blocking submit/poll/wait surface.
//!
//! No `unsafe` code is permitted at the crate level; the libc platform
//! backend and caller-owned read buffers opt back in locally.

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod buffer;
pub mod config;
pub mod errno;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod queue;
pub mod structured_log;

pub use buffer::ReadBuffer;
pub use config::{LogTarget, QueueConfig};
pub use error::QueueError;
pub use metrics::{MetricsSnapshot, QueueMetrics};
pub use platform::{Platform, PlatformHandle, PosixPlatform};
pub use queue::{Completion, IoQueue, RequestId, SubmitFault};
