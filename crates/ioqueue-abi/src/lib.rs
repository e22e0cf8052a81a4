// All extern "C" exports accept raw pointers from C callers and validate
// them at runtime, so per-function safety docs would be boilerplate.
#![allow(clippy::missing_safety_doc)]
//! # ioqueue-abi
//!
//! `extern "C"` boundary for the ioqueue. Every entry point works on one
//! process-wide [`IoQueue`](ioqueue_core::IoQueue) built from the
//! environment on first use, and reports failure C-style: a sentinel return
//! (0 id, -1 result) plus an errno readable via [`errno_abi`].
//!
//! ```text
//! C caller -> ABI entry (this crate) -> argument checks -> IoQueue -> return
//! ```

pub mod errno_abi;
pub mod ioqueue_abi;

pub use ioqueue_abi::default_queue;
