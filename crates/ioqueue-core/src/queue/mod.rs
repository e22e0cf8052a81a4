//! The request queue.
//!
//! Callers submit open and read requests, receive a [`RequestId`], and later
//! poll or wait for a [`Completion`]. A single background worker executes
//! requests one at a time, soonest deadline first, with the queue lock
//! released around every syscall. Reads longer than the chunk limit run as
//! several chunks so deadline-bearing requests can slip in between.

mod harness;
mod pending;
mod sched;
mod split;
mod table;
mod worker;

use std::ffi::{CStr, CString};
use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

pub use harness::SubmitFault;

use self::harness::FaultInjection;
use self::table::{ReadState, RequestKind, RequestTable};
use crate::buffer::ReadBuffer;
use crate::config::QueueConfig;
use crate::errno;
use crate::error::QueueError;
use crate::metrics::{MetricsSnapshot, QueueMetrics};
use crate::platform::{
    NANOS_PER_SECOND, Platform, PlatformHandle, PosixPlatform, open_flags_request_write,
};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel};

/// Handle to a submitted request. Slot `n` is always id `n + 1`, so raw
/// id 0 never names a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(NonZeroU64);

impl RequestId {
    /// `None` for 0.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }

    fn from_index(index: usize) -> Self {
        Self(NonZeroU64::MIN.saturating_add(index as u64))
    }
}

/// Final outcome of a request.
///
/// `result` is the byte count for reads and the raw handle for opens, or -1
/// on failure. `error` is the platform errno, `ECANCELED` after a cancel.
/// A split read that failed after some chunks landed keeps the partial
/// byte count alongside a nonzero `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub result: i64,
    pub error: i32,
}

impl Completion {
    #[must_use]
    pub const fn succeeded(self) -> bool {
        self.result >= 0 && self.error == 0
    }

    #[must_use]
    pub const fn was_cancelled(self) -> bool {
        self.error == errno::ECANCELED
    }

    /// Opened handle, for a successful open.
    #[must_use]
    pub const fn handle(self) -> Option<PlatformHandle> {
        if self.succeeded() {
            Some(PlatformHandle::from_raw(self.result))
        } else {
            None
        }
    }
}

pub(crate) struct QueueState {
    initialized: bool,
    /// Bumped by every reset.
    epoch: u64,
    table: RequestTable,
    read_limit: usize,
    faults: FaultInjection,
    worker: Option<JoinHandle<()>>,
    stop: bool,
    sync_fallback_warned: bool,
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    /// Wakes the worker: new work, a step, a resume, or stop.
    work_ready: Condvar,
    step_done: Condvar,
    platform: Arc<dyn Platform>,
    metrics: QueueMetrics,
    log: Mutex<LogEmitter>,
    config: QueueConfig,
}

impl Shared {
    fn log<F>(&self, level: LogLevel, event: &str, decorate: F)
    where
        F: FnOnce(LogEntry) -> LogEntry,
    {
        let mut log = self.log.lock();
        let entry = decorate(log.entry(level, event));
        let _ = log.emit_entry(&entry);
    }
}

/// A deadline-aware background I/O queue.
///
/// Dropping the queue performs [`reset`](Self::reset).
pub struct IoQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for IoQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("IoQueue")
            .field("initialized", &state.initialized)
            .field("table_len", &state.table.len())
            .field("read_limit", &state.read_limit)
            .field("worker_running", &state.worker.is_some())
            .finish()
    }
}

impl Default for IoQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IoQueue {
    /// A queue with default configuration over the host platform.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    #[must_use]
    pub fn with_config(config: QueueConfig) -> Self {
        let emitter = LogEmitter::from_target(&config.log, "ioqueue");
        Self::with_parts(config, Arc::new(PosixPlatform), emitter)
    }

    /// Fully explicit construction; `config.log` is ignored in favor of
    /// `emitter`.
    #[must_use]
    pub fn with_parts(config: QueueConfig, platform: Arc<dyn Platform>, emitter: LogEmitter) -> Self {
        let state = QueueState {
            initialized: true,
            epoch: 0,
            table: RequestTable::new(config.shrink_slack),
            read_limit: config.read_limit.max(1),
            faults: FaultInjection::default(),
            worker: None,
            stop: false,
            sync_fallback_warned: false,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                work_ready: Condvar::new(),
                step_done: Condvar::new(),
                platform,
                metrics: QueueMetrics::new(),
                log: Mutex::new(emitter),
                config,
            }),
        }
    }

    /// Queue an open of `path`. Write-class `flags` are rejected.
    pub fn submit_open(
        &self,
        path: impl AsRef<Path>,
        flags: i32,
        deadline: Option<Duration>,
    ) -> Result<RequestId, QueueError> {
        let path = CString::new(path.as_ref().as_os_str().as_encoded_bytes())
            .map_err(|_| QueueError::InvalidArgument("path contains a NUL byte"))?;
        self.submit_open_cstr(&path, flags, deadline)
    }

    /// [`submit_open`](Self::submit_open) for a path that is already a C string.
    pub fn submit_open_cstr(
        &self,
        path: &CStr,
        flags: i32,
        deadline: Option<Duration>,
    ) -> Result<RequestId, QueueError> {
        if open_flags_request_write(flags) {
            return Err(QueueError::InvalidArgument("open flags request write access"));
        }
        let kind = RequestKind::Open {
            path: path.to_owned(),
            flags,
        };
        self.submit(kind, deadline)
    }

    /// Queue a read filling all of `buffer` from `offset` in `handle`.
    pub fn submit_read(
        &self,
        handle: PlatformHandle,
        buffer: ReadBuffer,
        offset: u64,
        deadline: Option<Duration>,
    ) -> Result<RequestId, QueueError> {
        if offset > i64::MAX as u64 {
            return Err(QueueError::InvalidArgument("offset out of range"));
        }
        let remaining = buffer.len();
        let kind = RequestKind::Read(ReadState {
            handle,
            buffer,
            buffer_offset: 0,
            remaining,
            position: offset,
        });
        self.submit(kind, deadline)
    }

    fn submit(&self, kind: RequestKind, deadline: Option<Duration>) -> Result<RequestId, QueueError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if !state.initialized || state.stop {
            return Err(QueueError::NotInitialized);
        }
        if matches!(kind, RequestKind::Read(_))
            && let Some(fault) = state.faults.submit_fault.take()
        {
            return Err(fault.into());
        }

        let deadline = deadline.map(|after| deadline_ticks(&*shared.platform, after));
        let before = state.table.len();
        let relocate = state.faults.relocate_on_grow;
        let index = state.table.allocate(deadline, kind, relocate)?;
        if state.table.len() > before {
            QueueMetrics::inc(&shared.metrics.table_grows);
        }
        QueueMetrics::inc(&shared.metrics.submitted);
        let id = RequestId::from_index(index);

        let spawn_error = match self.ensure_worker(&mut state) {
            Ok(()) => {
                state.table.enqueue(index);
                shared.work_ready.notify_all();
                return Ok(id);
            }
            Err(error) => error,
        };

        QueueMetrics::inc(&shared.metrics.sync_fallbacks);
        let first = !std::mem::replace(&mut state.sync_fallback_warned, true);
        worker::run_inline(&mut state, shared, index);
        drop(state);

        let level = if first { LogLevel::Warn } else { LogLevel::Debug };
        shared.log(level, "sync_fallback", |entry| {
            entry.with_request(id.as_raw()).with_details(serde_json::json!({
                "spawn_error": spawn_error.to_string(),
                "message": "worker thread unavailable, request executed on the submitting thread",
            }))
        });
        Ok(id)
    }

    fn ensure_worker(&self, state: &mut QueueState) -> std::io::Result<()> {
        if state.worker.is_some() {
            return Ok(());
        }
        if std::mem::take(&mut state.faults.fail_worker_spawn) {
            return Err(std::io::Error::from_raw_os_error(errno::EAGAIN));
        }
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(self.shared.config.worker_name.clone())
            .spawn(move || worker::run(shared))?;
        state.worker = Some(handle);
        Ok(())
    }

    /// Whether `id` has completed.
    ///
    /// Fails with [`QueueError::NoSuchRequest`] for an id with no live request.
    pub fn try_poll(&self, id: RequestId) -> Result<bool, QueueError> {
        let state = self.shared.state.lock();
        state
            .table
            .index_for(id.as_raw())
            .and_then(|index| state.table.slot(index))
            .map(|slot| slot.complete)
            .ok_or(QueueError::NoSuchRequest)
    }

    /// Like [`try_poll`](Self::try_poll), but an unknown id reads as complete
    /// so a polling loop cannot spin forever on it.
    #[must_use]
    pub fn poll(&self, id: RequestId) -> bool {
        self.try_poll(id).unwrap_or(true)
    }

    /// Block until `id` completes, then release its slot.
    ///
    /// Every live request must be waited on exactly once, cancelled or not.
    pub fn wait(&self, id: RequestId) -> Result<Completion, QueueError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let index = state
            .table
            .index_for(id.as_raw())
            .ok_or(QueueError::NoSuchRequest)?;
        let (generation, done, complete) = match state.table.slot(index) {
            Some(slot) => (slot.generation, Arc::clone(&slot.done), slot.complete),
            None => return Err(QueueError::NoSuchRequest),
        };

        if !complete && state.faults.paused && state.faults.resume_on_wait {
            state.faults.resume_targets.push(index);
            shared.work_ready.notify_all();
        }

        let completion = loop {
            match state.table.slot(index) {
                Some(slot) if slot.in_use && slot.generation == generation => {
                    if slot.complete {
                        break Completion {
                            result: slot.result,
                            error: slot.error,
                        };
                    }
                }
                // Reset while waiting.
                _ => return Err(QueueError::NoSuchRequest),
            }
            done.wait(&mut state);
        };

        if state.table.release(index) {
            QueueMetrics::inc(&shared.metrics.table_shrinks);
        }
        QueueMetrics::inc(&shared.metrics.completed);
        Ok(completion)
    }

    /// Request cancellation of `id`.
    ///
    /// An unfinished request will not run (or run no further chunks) and
    /// completes with `ECANCELED`. A finished one has its outcome replaced by
    /// `ECANCELED`, closing the handle of a successful open. The slot is
    /// still released only by [`wait`](Self::wait).
    pub fn cancel(&self, id: RequestId) -> Result<(), QueueError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let Some(index) = state.table.index_for(id.as_raw()) else {
            drop(state);
            shared.log(LogLevel::Warn, "cancel_unknown_request", |entry| {
                entry.with_request(id.as_raw()).with_errno(errno::ESRCH)
            });
            return Err(QueueError::NoSuchRequest);
        };
        let stale = cancel_slot(&mut state, &shared.metrics, index);
        drop(state);

        if let Some(handle) = stale {
            shared.platform.close(handle);
        }
        Ok(())
    }

    /// Cancel every live read on `handle`. Returns how many were cancelled.
    pub fn cancel_all_for_handle(&self, handle: PlatformHandle) -> usize {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let targets: Vec<usize> = state
            .table
            .in_use()
            .filter(|(_, slot)| {
                matches!(&slot.kind, Some(RequestKind::Read(read)) if read.handle == handle)
            })
            .map(|(index, _)| index)
            .collect();
        for &index in &targets {
            cancel_slot(&mut state, &shared.metrics, index);
        }
        targets.len()
    }

    /// Cap the length of a single read syscall. Zero is rejected.
    pub fn set_read_chunk_limit(&self, bytes: usize) -> Result<(), QueueError> {
        if bytes == 0 {
            return Err(QueueError::InvalidArgument("read chunk limit must be positive"));
        }
        self.shared.state.lock().read_limit = bytes;
        Ok(())
    }

    #[must_use]
    pub fn read_chunk_limit(&self) -> usize {
        self.shared.state.lock().read_limit
    }

    /// Re-arm a queue after [`reset`](Self::reset). Idempotent.
    pub fn init(&self) {
        self.shared.state.lock().initialized = true;
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }

    /// Stop the worker, drop every request and restore defaults.
    ///
    /// Waiters blocked on dropped requests wake with
    /// [`QueueError::NoSuchRequest`]. Handles from finished opens nobody
    /// waited on are closed. Submissions fail until [`init`](Self::init).
    pub fn reset(&self) {
        let shared = &self.shared;
        let mut worker = {
            let mut state = shared.state.lock();
            // Let an overlapping reset finish first.
            while state.stop {
                shared.step_done.wait(&mut state);
            }
            state.initialized = false;
            state.stop = true;
            shared.work_ready.notify_all();
            shared.step_done.notify_all();
            state.worker.take()
        };

        let orphaned = loop {
            if let Some(handle) = worker.take()
                && handle.join().is_err()
            {
                shared.log(LogLevel::Error, "worker_panicked", |entry| entry);
            }
            let mut state = shared.state.lock();
            // A worker started while the lock was released must be joined
            // before `stop` clears.
            if let Some(late) = state.worker.take() {
                worker = Some(late);
                continue;
            }
            let orphaned = state.table.clear();
            state.faults = FaultInjection::default();
            state.read_limit = shared.config.read_limit.max(1);
            state.initialized = false;
            state.stop = false;
            state.sync_fallback_warned = false;
            state.epoch = state.epoch.wrapping_add(1);
            shared.step_done.notify_all();
            break orphaned;
        };
        for &handle in &orphaned {
            shared.platform.close(handle);
        }

        shared.log(LogLevel::Info, "reset", |entry| {
            entry.with_details(serde_json::json!({ "closed_handles": orphaned.len() }))
        });
    }

    /// Current request table size in slots.
    #[must_use]
    pub fn table_len(&self) -> usize {
        self.shared.state.lock().table.len()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Drop for IoQueue {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Apply a cancel to a live slot. Returns a handle the caller must close.
fn cancel_slot(state: &mut QueueState, metrics: &QueueMetrics, index: usize) -> Option<PlatformHandle> {
    let slot = state.table.slot_mut(index)?;
    if !slot.cancelled {
        QueueMetrics::inc(&metrics.cancelled);
    }
    slot.cancelled = true;
    if !slot.complete {
        return None;
    }
    let stale = slot.owned_handle();
    slot.result = -1;
    slot.error = errno::ECANCELED;
    stale
}

/// Absolute deadline `after` from now, in platform ticks.
fn deadline_ticks(platform: &dyn Platform, after: Duration) -> u64 {
    let ticks = after.as_nanos() * u128::from(platform.ticks_per_second())
        / u128::from(NANOS_PER_SECOND);
    let ticks = u64::try_from(ticks.min(i64::MAX as u128)).unwrap_or(i64::MAX as u64);
    platform.now_ticks().wrapping_add(ticks)
}
