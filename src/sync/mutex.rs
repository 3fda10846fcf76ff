//! Recursive mutex with priority inheritance.
//!
//! Ownership is a single atomic word claimed with compare-and-swap, so the
//! fast path never takes a lock. Blocked requesters sit in a bounded heap
//! ordered by their priority; the generation counter detects a release that
//! slips in between "observed busy" and "went to sleep" (see the acquire
//! path in the kernel module). The waiter heap itself only changes inside
//! kernel requests and sits behind a spin mutex.

use portable_atomic::{AtomicU32, Ordering};
use spin::Mutex as SpinMutex;

use crate::queue::{ByPriority, TaskHeap};
use crate::task::{TaskId, NO_TASK};

/// Recursive lock with ownership and a priority-ordered waiter queue.
pub struct Mutex {
    /// Owning task index, or none. Claimed by compare-and-swap.
    owner: AtomicU32,
    /// Acquisitions by the owner not yet matched by releases.
    recursion: AtomicU32,
    /// Bumped on every full release; waiters use it to detect a release
    /// racing their decision to block.
    generation: AtomicU32,
    /// Blocked requesters, most urgent first.
    pub(crate) waiters: SpinMutex<TaskHeap<ByPriority>>,
}

impl Mutex {
    /// Create a mutex that can hold at most `max_waiters` blocked tasks.
    ///
    /// Size this to the number of tasks that can contend for the lock; the
    /// task capacity of the kernel is always sufficient.
    pub fn new(max_waiters: usize) -> Self {
        Self {
            owner: AtomicU32::new(NO_TASK),
            recursion: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            waiters: SpinMutex::new(TaskHeap::with_capacity(max_waiters)),
        }
    }

    /// The current owner, if any.
    pub fn owner(&self) -> Option<TaskId> {
        match self.owner.load(Ordering::Acquire) {
            NO_TASK => None,
            raw => Some(TaskId(raw)),
        }
    }

    /// Unmatched acquisitions by the owner. Zero exactly when unowned.
    pub fn recursion_count(&self) -> u32 {
        self.recursion.load(Ordering::Acquire)
    }

    /// Whether `id` holds the lock.
    pub fn is_owned_by(&self, id: TaskId) -> bool {
        self.owner.load(Ordering::Acquire) == id.0
    }

    /// Claim the lock for `id` if it is free, or recognise `id` as the
    /// existing owner. Returns false when another task holds it.
    pub(crate) fn claim_or_reenter(&self, id: TaskId) -> bool {
        match self
            .owner
            .compare_exchange(NO_TASK, id.0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == id.0,
        }
    }

    pub(crate) fn increment_recursion(&self) {
        self.recursion.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the recursion count and return the new value.
    pub(crate) fn decrement_recursion(&self) -> u32 {
        self.recursion.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn clear_owner(&self) {
        self.owner.store(NO_TASK, Ordering::Release);
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
