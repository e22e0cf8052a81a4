//! The background worker and the execute/publish cycle it shares with the
//! inline fallback.

use std::any::Any;
use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::MutexGuard;

use super::sched::{self, DispatchReason, Selection};
use super::split::{self, ChunkOutcome, ReadJob};
use super::table::RequestKind;
use super::{QueueState, Shared};
use crate::errno;
use crate::metrics::QueueMetrics;
use crate::platform::{Platform, PlatformHandle};
use crate::structured_log::LogLevel;

enum Job {
    Open { path: CString, flags: i32 },
    Read(ReadJob),
}

enum Outcome {
    Opened(Result<PlatformHandle, i32>),
    Read(ChunkOutcome),
}

struct Dispatched {
    index: usize,
    generation: u64,
    job: Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Published {
    Complete,
    Continue,
    Stale,
}

/// Worker thread body. Runs until `stop` is observed.
pub(super) fn run(shared: Arc<Shared>) {
    shared.log(LogLevel::Info, "worker_started", |entry| entry);

    let mut state = shared.state.lock();
    while !state.stop {
        if state.faults.holds_worker() {
            shared.work_ready.wait(&mut state);
            continue;
        }
        let stepping = state.faults.step_pending();
        let now = shared.platform.now_ticks();

        let Some(selection) = sched::select_next(&state.table, now) else {
            if stepping {
                state.faults.finish_step(false);
                shared.step_done.notify_all();
            } else {
                shared.work_ready.wait(&mut state);
            }
            continue;
        };

        dispatch(&mut state, &shared, selection);
        if stepping {
            state.faults.finish_step(true);
            shared.step_done.notify_all();
        }
    }
    drop(state);

    shared.log(LogLevel::Info, "worker_stopped", |entry| entry);
}

fn dispatch(state: &mut MutexGuard<'_, QueueState>, shared: &Shared, selection: Selection) {
    let index = selection.index;
    state.table.unlink(selection.prev, index);
    match selection.reason {
        DispatchReason::Deadline => QueueMetrics::inc(&shared.metrics.deadline_dispatches),
        DispatchReason::Fifo => QueueMetrics::inc(&shared.metrics.fifo_dispatches),
    }

    if state.table.slot(index).is_some_and(|slot| slot.cancelled) {
        complete_slot(state, &shared.metrics, index, -1, errno::ECANCELED);
        return;
    }

    if execute_once(state, shared, index) == Published::Continue {
        state.table.enqueue_front(index);
        QueueMetrics::inc(&shared.metrics.split_continuations);
    }
}

/// Execute `index` to completion on the calling thread.
pub(super) fn run_inline(state: &mut MutexGuard<'_, QueueState>, shared: &Shared, index: usize) {
    while execute_once(state, shared, index) == Published::Continue {}
}

/// One take/execute/publish cycle. The lock is released while the
/// syscall runs.
fn execute_once(state: &mut MutexGuard<'_, QueueState>, shared: &Shared, index: usize) -> Published {
    let Some(Dispatched {
        index,
        generation,
        job,
    }) = take_job(state, index)
    else {
        return Published::Stale;
    };
    let outcome = MutexGuard::unlocked(state, || execute_contained(shared, index, &job));
    publish(state, shared, index, generation, outcome)
}

/// Run `job`, turning a panic in the platform into an `EIO` completion so
/// the worker survives and the request's waiters wake.
fn execute_contained(shared: &Shared, index: usize, job: &Job) -> Outcome {
    let platform = &*shared.platform;
    match panic::catch_unwind(AssertUnwindSafe(|| execute(platform, job))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            shared.log(LogLevel::Error, "worker_panicked", |entry| {
                entry
                    .with_request(index as u64 + 1)
                    .with_errno(errno::EIO)
                    .with_details(serde_json::json!({ "panic": message }))
            });
            match job {
                Job::Open { .. } => Outcome::Opened(Err(errno::EIO)),
                Job::Read(read) => Outcome::Read(ChunkOutcome::Complete {
                    result: if read.accumulated > 0 { read.accumulated } else { -1 },
                    error: errno::EIO,
                }),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn take_job(state: &mut QueueState, index: usize) -> Option<Dispatched> {
    let read_limit = state.read_limit;
    let slot = state.table.slot_mut(index).filter(|slot| slot.in_use)?;
    let mut job = match slot.kind.as_ref()? {
        RequestKind::Open { path, flags } => Job::Open {
            path: path.clone(),
            flags: *flags,
        },
        RequestKind::Read(read) => Job::Read(ReadJob {
            handle: read.handle,
            buffer: read.buffer.clone(),
            buffer_offset: read.buffer_offset,
            remaining: read.remaining,
            position: read.position,
            accumulated: slot.result,
            limit: read_limit,
            inject_failure: false,
        }),
    };
    slot.executing = true;
    let generation = slot.generation;

    if let Job::Read(read) = &mut job {
        read.inject_failure = std::mem::take(&mut state.faults.fail_next_read);
    }
    Some(Dispatched {
        index,
        generation,
        job,
    })
}

fn execute(platform: &dyn Platform, job: &Job) -> Outcome {
    match job {
        Job::Open { path, flags } => Outcome::Opened(platform.open(path, *flags)),
        Job::Read(read) => Outcome::Read(split::run_chunk(platform, read)),
    }
}

fn publish(
    state: &mut MutexGuard<'_, QueueState>,
    shared: &Shared,
    index: usize,
    generation: u64,
    outcome: Outcome,
) -> Published {
    let live = state
        .table
        .slot(index)
        .is_some_and(|slot| slot.in_use && slot.generation == generation);
    if !live {
        // The queue was reset while this ran.
        if let Outcome::Opened(Ok(handle)) = outcome {
            MutexGuard::unlocked(state, || shared.platform.close(handle));
        }
        return Published::Stale;
    }

    let mut cancelled = false;
    if let Some(slot) = state.table.slot_mut(index) {
        slot.executing = false;
        cancelled = slot.cancelled;
    }
    if matches!(outcome, Outcome::Read(_)) {
        QueueMetrics::inc(&shared.metrics.read_chunks);
    }

    match outcome {
        Outcome::Opened(Ok(handle)) if cancelled => {
            complete_slot(state, &shared.metrics, index, -1, errno::ECANCELED);
            MutexGuard::unlocked(state, || shared.platform.close(handle));
        }
        Outcome::Opened(Ok(handle)) => {
            complete_slot(state, &shared.metrics, index, handle.as_raw(), 0);
        }
        Outcome::Opened(Err(error)) => {
            let error = if cancelled { errno::ECANCELED } else { error };
            complete_slot(state, &shared.metrics, index, -1, error);
        }
        Outcome::Read(_) if cancelled => {
            complete_slot(state, &shared.metrics, index, -1, errno::ECANCELED);
        }
        Outcome::Read(ChunkOutcome::Continue {
            buffer_offset,
            remaining,
            position,
            accumulated,
        }) => {
            if let Some(slot) = state.table.slot_mut(index) {
                if let Some(RequestKind::Read(read)) = slot.kind.as_mut() {
                    read.buffer_offset = buffer_offset;
                    read.remaining = remaining;
                    read.position = position;
                }
                slot.result = accumulated;
            }
            return Published::Continue;
        }
        Outcome::Read(ChunkOutcome::Complete { result, error }) => {
            complete_slot(state, &shared.metrics, index, result, error);
        }
    }
    Published::Complete
}

/// Record the final outcome and wake this request's waiters.
pub(super) fn complete_slot(
    state: &mut QueueState,
    metrics: &QueueMetrics,
    index: usize,
    result: i64,
    error: i32,
) {
    if let Some(slot) = state.table.slot_mut(index) {
        slot.complete = true;
        slot.executing = false;
        slot.result = result;
        slot.error = error;
        slot.done.notify_all();
    }
    state.faults.resume_targets.retain(|&target| target != index);
    if result < 0 {
        QueueMetrics::inc(&metrics.failed);
    }
}
