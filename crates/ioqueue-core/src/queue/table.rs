//! Request table: a growable array of slots addressed by index.
//!
//! Slot `i` is always exposed as request id `i + 1`. The table grows one slot
//! at a time when no free slot exists and shrinks when the highest live slot
//! is released, keeping `slack` spare slots above the highest live one.

use std::ffi::CString;
use std::sync::Arc;

use parking_lot::Condvar;

use crate::buffer::ReadBuffer;
use crate::error::QueueError;
use crate::platform::PlatformHandle;

/// Outstanding state of a read request.
#[derive(Debug, Clone)]
pub(crate) struct ReadState {
    pub handle: PlatformHandle,
    pub buffer: ReadBuffer,
    /// Where in `buffer` the next chunk lands.
    pub buffer_offset: usize,
    /// Bytes still to read.
    pub remaining: usize,
    /// File offset of the next chunk.
    pub position: u64,
}

#[derive(Debug, Clone)]
pub(crate) enum RequestKind {
    Open { path: CString, flags: i32 },
    Read(ReadState),
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub in_use: bool,
    pub complete: bool,
    pub cancelled: bool,
    pub executing: bool,
    /// Distinguishes successive occupants of the same slot.
    pub generation: u64,
    pub deadline: Option<u64>,
    pub next_pending: Option<usize>,
    pub kind: Option<RequestKind>,
    /// Bytes read so far, an opened handle, or -1.
    pub result: i64,
    pub error: i32,
    pub done: Arc<Condvar>,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            in_use: false,
            complete: false,
            cancelled: false,
            executing: false,
            generation: 0,
            deadline: None,
            next_pending: None,
            kind: None,
            result: 0,
            error: 0,
            done: Arc::new(Condvar::new()),
        }
    }

    fn vacate(&mut self) {
        self.in_use = false;
        self.complete = false;
        self.cancelled = false;
        self.executing = false;
        self.deadline = None;
        self.next_pending = None;
        self.kind = None;
        self.result = 0;
        self.error = 0;
    }

    /// Handle still owned by a finished, successful open.
    pub fn owned_handle(&self) -> Option<PlatformHandle> {
        match self.kind {
            Some(RequestKind::Open { .. }) if self.complete && self.result >= 0 => {
                Some(PlatformHandle::from_raw(self.result))
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct RequestTable {
    pub(super) slots: Vec<Slot>,
    pub(super) first_pending: Option<usize>,
    pub(super) last_pending: Option<usize>,
    slack: usize,
    next_generation: u64,
}

impl RequestTable {
    pub fn new(slack: usize) -> Self {
        Self {
            slots: Vec::new(),
            first_pending: None,
            last_pending: None,
            slack,
            next_generation: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    /// Live slot addressed by a request id.
    pub fn index_for(&self, id: u64) -> Option<usize> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.slots
            .get(index)
            .filter(|slot| slot.in_use)
            .map(|_| index)
    }

    pub fn in_use(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots.iter().enumerate().filter(|(_, slot)| slot.in_use)
    }

    /// Claim the first free slot, growing by one if none is free.
    ///
    /// With `relocate` set, growth always moves the slots to a fresh block.
    pub fn allocate(
        &mut self,
        deadline: Option<u64>,
        kind: RequestKind,
        relocate: bool,
    ) -> Result<usize, QueueError> {
        let index = match self.slots.iter().position(|slot| !slot.in_use) {
            Some(index) => index,
            None => {
                self.grow(relocate)?;
                self.slots.len() - 1
            }
        };
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let slot = &mut self.slots[index];
        slot.vacate();
        slot.in_use = true;
        slot.generation = generation;
        slot.deadline = deadline;
        slot.kind = Some(kind);
        Ok(index)
    }

    fn grow(&mut self, relocate: bool) -> Result<(), QueueError> {
        let new_len = self.slots.len() + 1;
        if relocate {
            let mut moved = Vec::new();
            moved
                .try_reserve_exact(new_len)
                .map_err(|_| QueueError::OutOfMemory)?;
            moved.append(&mut self.slots);
            self.slots = moved;
        } else {
            self.slots
                .try_reserve_exact(1)
                .map_err(|_| QueueError::OutOfMemory)?;
        }
        self.slots.push(Slot::vacant());
        Ok(())
    }

    /// Free a slot. Returns true when the table shrank.
    pub fn release(&mut self, index: usize) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        slot.vacate();

        let highest_live = self.slots.iter().rposition(|slot| slot.in_use);
        if highest_live.is_some_and(|highest| highest > index) {
            return false;
        }
        let keep = highest_live.map_or(0, |highest| highest + 1) + self.slack;
        if keep >= self.slots.len() {
            return false;
        }
        self.resize_down(keep);
        true
    }

    /// Drop slots past `keep`. Every dropped slot is vacant.
    ///
    /// If a smaller block cannot be obtained the old one is kept.
    fn resize_down(&mut self, keep: usize) {
        self.slots.truncate(keep);
        let mut smaller = Vec::new();
        if smaller.try_reserve_exact(keep).is_ok() {
            smaller.append(&mut self.slots);
            self.slots = smaller;
        }
    }

    /// Empty the table, waking every waiter. Returns handles of finished
    /// opens nobody collected; the caller closes them.
    pub fn clear(&mut self) -> Vec<PlatformHandle> {
        let orphaned = self.slots.iter().filter_map(Slot::owned_handle).collect();
        for slot in &self.slots {
            slot.done.notify_all();
        }
        self.slots = Vec::new();
        self.first_pending = None;
        self.last_pending = None;
        orphaned
    }
}
