//! Task control blocks and the fixed task arena.
//!
//! Every schedulable task is a slot in a [`TaskTable`] created once at
//! kernel construction, addressed by a stable [`TaskId`]. Queue linkage is
//! index-based: the rings, heaps and lock-free lists all thread through the
//! `prev`/`next` words stored here, and the `location` tag records which one
//! of those structures (at most) currently holds the task.

use portable_atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

extern crate alloc;
use alloc::vec::Vec;
use alloc::boxed::Box;

/// Link value meaning "no task".
pub(crate) const NO_TASK: u32 = u32::MAX;

/// Stable identifier of a task: its index in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    /// The reserved idle task. Always runnable, never queued anywhere.
    pub const IDLE: TaskId = TaskId(0);

    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is the reserved idle task.
    pub fn is_idle(self) -> bool {
        self == Self::IDLE
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bits of the per-task run state word.
pub mod state {
    /// The task gave up the rest of its turn voluntarily.
    pub const YIELD: u8 = 1 << 0;
    /// The task is in a timed sleep.
    pub const SLEEP: u8 = 1 << 1;
}

/// Which kernel structure currently holds a task.
///
/// A task is in at most one of these at any instant; the tag makes that a
/// checkable property instead of an implicit pointer-graph one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Location {
    /// Not queued anywhere: unregistered, exited, or currently the sole
    /// state of the idle task.
    None = 0,
    /// In the ready ring of its priority level.
    Ready = 1,
    /// In the sleeping heap.
    Sleeping = 2,
    /// In some mutex's waiter heap.
    MutexWait = 3,
    /// In some semaphore's waiter list.
    SemWait = 4,
    /// In the global notification wait list.
    NotifyWait = 5,
    /// In the pending list, on its way back to a ready ring.
    Pending = 6,
}

impl Location {
    fn from_u8(raw: u8) -> Location {
        match raw {
            1 => Location::Ready,
            2 => Location::Sleeping,
            3 => Location::MutexWait,
            4 => Location::SemWait,
            5 => Location::NotifyWait,
            6 => Location::Pending,
            _ => Location::None,
        }
    }
}

/// Task control block.
///
/// All fields are atomics because the cross-context subset (state flags,
/// links, location) can be touched from interrupt handlers while a task
/// runs; the remainder only ever changes under the kernel request lock and
/// uses the same types for uniformity.
pub struct Tcb {
    /// Opaque cursor into the task's private stack. Written only by the
    /// context-switch mechanism.
    sp: AtomicUsize,
    /// YIELD/SLEEP flags; cleared by the scheduler when the task is picked.
    state: AtomicU8,
    /// Current effective priority level, 0-indexed. Lower is more urgent.
    priority: AtomicU8,
    /// Level assigned at initialisation; restored after a priority boost.
    original_priority: AtomicU8,
    /// Wake tick while sleeping; unused otherwise.
    wake: AtomicU32,
    /// Ring predecessor. Only meaningful while in a ready ring.
    prev: AtomicU32,
    /// Ring successor, or the singly-linked chain link while in a lock-free
    /// list. The two uses are mutually exclusive per the location tag.
    next: AtomicU32,
    /// Which structure currently holds this task.
    location: AtomicU8,
}

impl Tcb {
    fn new() -> Self {
        Self {
            sp: AtomicUsize::new(0),
            state: AtomicU8::new(0),
            priority: AtomicU8::new(0),
            original_priority: AtomicU8::new(0),
            wake: AtomicU32::new(0),
            prev: AtomicU32::new(NO_TASK),
            next: AtomicU32::new(NO_TASK),
            location: AtomicU8::new(Location::None as u8),
        }
    }

    /// Current stack pointer.
    pub fn sp(&self) -> usize {
        self.sp.load(Ordering::Acquire)
    }

    /// Update the stack pointer. Reserved for the context-switch mechanism.
    pub fn set_sp(&self, sp: usize) {
        self.sp.store(sp, Ordering::Release);
    }

    /// Current run-state flags.
    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn set_state_flags(&self, flags: u8) {
        self.state.fetch_or(flags, Ordering::AcqRel);
    }

    pub(crate) fn clear_state_flags(&self, flags: u8) {
        self.state.fetch_and(!flags, Ordering::AcqRel);
    }

    /// Current effective priority level, 0-indexed.
    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::Acquire)
    }

    pub(crate) fn set_priority(&self, level: u8) {
        self.priority.store(level, Ordering::Release);
    }

    /// Level assigned at initialisation.
    pub fn original_priority(&self) -> u8 {
        self.original_priority.load(Ordering::Acquire)
    }

    pub(crate) fn set_original_priority(&self, level: u8) {
        self.original_priority.store(level, Ordering::Release);
    }

    /// Wake tick recorded for the current sleep.
    pub fn wake(&self) -> u32 {
        self.wake.load(Ordering::Acquire)
    }

    pub(crate) fn set_wake(&self, tick: u32) {
        self.wake.store(tick, Ordering::Release);
    }

    /// Which kernel structure currently holds the task.
    pub fn location(&self) -> Location {
        Location::from_u8(self.location.load(Ordering::Acquire))
    }

    pub(crate) fn set_location(&self, location: Location) {
        self.location.store(location as u8, Ordering::Release);
    }

    pub(crate) fn prev_link(&self) -> u32 {
        self.prev.load(Ordering::Acquire)
    }

    pub(crate) fn set_prev_link(&self, link: u32) {
        self.prev.store(link, Ordering::Release);
    }

    pub(crate) fn next_link(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }

    pub(crate) fn set_next_link(&self, link: u32) {
        self.next.store(link, Ordering::Release);
    }

    /// Compare-and-swap on the chain link, for the lock-free list's
    /// tail extraction.
    pub(crate) fn cas_next_link(&self, expected: u32, new: u32) -> bool {
        self.next
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Fixed arena of task control blocks.
///
/// Slot 0 is reserved for the idle task. Slots are handed out once at task
/// initialisation and never recycled; the arena size bounds the worst-case
/// task count of the whole system.
pub struct TaskTable {
    slots: Box<[Tcb]>,
}

impl TaskTable {
    /// Create an arena with room for `tasks` registrable tasks plus the
    /// reserved idle slot.
    pub fn new(tasks: usize) -> Self {
        let mut slots = Vec::with_capacity(tasks + 1);
        for _ in 0..tasks + 1 {
            slots.push(Tcb::new());
        }
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Total number of slots, idle included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The control block for a task.
    pub fn get(&self, id: TaskId) -> &Tcb {
        &self.slots[id.index()]
    }

    pub(crate) fn raw(&self, index: u32) -> &Tcb {
        &self.slots[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tcb_is_unqueued() {
        let table = TaskTable::new(2);
        let tcb = table.get(TaskId(1));
        assert_eq!(tcb.location(), Location::None);
        assert_eq!(tcb.state(), 0);
        assert_eq!(tcb.prev_link(), NO_TASK);
        assert_eq!(tcb.next_link(), NO_TASK);
    }

    #[test]
    fn state_flags_set_and_clear() {
        let table = TaskTable::new(1);
        let tcb = table.get(TaskId(1));
        tcb.set_state_flags(state::YIELD | state::SLEEP);
        assert_eq!(tcb.state(), state::YIELD | state::SLEEP);
        tcb.clear_state_flags(state::YIELD);
        assert_eq!(tcb.state(), state::SLEEP);
    }

    #[test]
    fn idle_slot_is_reserved() {
        assert!(TaskId::IDLE.is_idle());
        assert_eq!(TaskId::IDLE.index(), 0);
        assert!(!TaskId(3).is_idle());
    }
}
