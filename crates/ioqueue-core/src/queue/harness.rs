//! Test and fault-injection controls.
//!
//! Every control is per queue and returns to its default on
//! [`IoQueue::reset`].

use super::IoQueue;
use crate::error::QueueError;

/// Failure class for a forced submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitFault {
    /// Fails like slot allocation running out of memory.
    Permanent,
    /// Fails with a retry-class error.
    Transient,
}

impl From<SubmitFault> for QueueError {
    fn from(fault: SubmitFault) -> Self {
        match fault {
            SubmitFault::Permanent => Self::OutOfMemory,
            SubmitFault::Transient => Self::Transient,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FaultInjection {
    pub relocate_on_grow: bool,
    pub paused: bool,
    pub resume_on_wait: bool,
    /// Slots whose waiters keep a paused worker running until they complete.
    pub resume_targets: Vec<usize>,
    pub steps_requested: u64,
    pub steps_completed: u64,
    pub last_step_dispatched: bool,
    pub submit_fault: Option<SubmitFault>,
    pub fail_next_read: bool,
    pub fail_worker_spawn: bool,
}

impl FaultInjection {
    pub fn step_pending(&self) -> bool {
        self.steps_requested > self.steps_completed
    }

    /// Whether the worker must sit idle even with work pending.
    pub fn holds_worker(&self) -> bool {
        self.paused && !self.step_pending() && self.resume_targets.is_empty()
    }

    pub fn finish_step(&mut self, dispatched: bool) {
        self.steps_completed += 1;
        self.last_step_dispatched = dispatched;
    }
}

impl IoQueue {
    /// Move the request table to a fresh allocation on every growth.
    pub fn set_relocate_on_grow(&self, enabled: bool) {
        self.shared.state.lock().faults.relocate_on_grow = enabled;
    }

    /// Stop dispatching until [`resume_worker`](Self::resume_worker).
    /// Submissions still queue up.
    pub fn pause_worker(&self) {
        self.shared.state.lock().faults.paused = true;
    }

    pub fn resume_worker(&self) {
        self.shared.state.lock().faults.paused = false;
        self.shared.work_ready.notify_all();
    }

    /// While paused, let the worker run whenever someone waits on an
    /// unfinished request, until that request completes.
    pub fn set_resume_on_wait(&self, enabled: bool) {
        self.shared.state.lock().faults.resume_on_wait = enabled;
    }

    /// Make the next read submission fail before it reaches the table.
    pub fn fail_next_read_submission(&self, fault: SubmitFault) {
        self.shared.state.lock().faults.submit_fault = Some(fault);
    }

    /// Make the next dispatched read chunk fail with `EIO`, reading nothing.
    pub fn fail_next_read(&self) {
        self.shared.state.lock().faults.fail_next_read = true;
    }

    /// Make the next worker start fail, forcing inline execution.
    pub fn fail_next_worker_spawn(&self) {
        self.shared.state.lock().faults.fail_worker_spawn = true;
    }

    /// Run one dispatch cycle of a paused worker and wait for it.
    ///
    /// Returns whether a request was dispatched. Returns false at once when
    /// the worker is not paused or not running.
    pub fn step_worker(&self) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if !state.faults.paused || state.worker.is_none() || state.stop {
            return false;
        }
        let epoch = state.epoch;
        state.faults.steps_requested += 1;
        let target = state.faults.steps_requested;
        shared.work_ready.notify_all();

        while state.faults.steps_completed < target {
            if state.stop || state.epoch != epoch {
                return false;
            }
            shared.step_done.wait(&mut state);
        }
        state.faults.last_step_dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_inert() {
        let faults = FaultInjection::default();
        assert!(!faults.holds_worker());
        assert!(!faults.step_pending());
        assert!(faults.submit_fault.is_none());
    }

    #[test]
    fn paused_worker_is_held_until_stepped_or_targeted() {
        let mut faults = FaultInjection {
            paused: true,
            ..FaultInjection::default()
        };
        assert!(faults.holds_worker());

        faults.steps_requested = 1;
        assert!(!faults.holds_worker());
        faults.finish_step(true);
        assert!(faults.holds_worker());
        assert!(faults.last_step_dispatched);

        faults.resume_targets.push(3);
        assert!(!faults.holds_worker());
    }

    #[test]
    fn submit_faults_map_to_errors() {
        assert_eq!(QueueError::from(SubmitFault::Permanent), QueueError::OutOfMemory);
        assert_eq!(QueueError::from(SubmitFault::Transient), QueueError::Transient);
    }
}
