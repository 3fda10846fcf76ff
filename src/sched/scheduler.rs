//! Round-robin priority scheduler.
//!
//! One circular doubly-linked ring of runnable tasks per priority level.
//! The running task stays in its ring; picking the next task at a level is
//! just advancing that ring's rotation by one, so yielding and scheduling
//! are the same operation. Tasks leave the rings only to sleep, block or
//! exit, and come back either from the sleeping heap (wake tick reached) or
//! through the lock-free pending list (handed over from another context).
//!
//! Everything here is mutated only while the kernel request lock is held;
//! the pending list is the one structure shared with other contexts and is
//! drained, never pushed, from this side of the fence.

use log::trace;

use crate::queue::{ByWakeTime, TaskHeap, TaskList};
use crate::task::{state, Location, TaskId, TaskTable, NO_TASK};
use crate::time::deadline_reached;

extern crate alloc;
use alloc::vec::Vec;
use alloc::boxed::Box;

/// Circular doubly-linked ring of ready tasks at one priority level.
///
/// `head` is the rotation point: the task most recently selected at this
/// level. New tasks are linked in just behind it, which puts them at the
/// back of the round-robin order.
struct ReadyRing {
    head: u32,
}

impl ReadyRing {
    const fn new() -> Self {
        Self { head: NO_TASK }
    }

    fn is_empty(&self) -> bool {
        self.head == NO_TASK
    }

    fn add(&mut self, table: &TaskTable, id: TaskId) {
        let tcb = table.get(id);
        if self.is_empty() {
            tcb.set_next_link(id.0);
            tcb.set_prev_link(id.0);
            self.head = id.0;
        } else {
            let head = table.raw(self.head);
            let tail = head.prev_link();
            tcb.set_next_link(self.head);
            tcb.set_prev_link(tail);
            table.raw(tail).set_next_link(id.0);
            head.set_prev_link(id.0);
        }
    }

    fn remove(&mut self, table: &TaskTable, id: TaskId) {
        let tcb = table.get(id);
        if tcb.next_link() == id.0 {
            // Sole task at this level.
            self.head = NO_TASK;
            return;
        }
        if self.head == id.0 {
            self.head = tcb.next_link();
        }
        let (prev, next) = (tcb.prev_link(), tcb.next_link());
        table.raw(next).set_prev_link(prev);
        table.raw(prev).set_next_link(next);
    }

    /// Rotate by one and return the new head.
    fn advance(&mut self, table: &TaskTable) -> TaskId {
        self.head = table.raw(self.head).next_link();
        TaskId(self.head)
    }
}

/// Scheduler state: the ready rings, the sleeping queue and the rotation
/// bookkeeping. Owned by the kernel behind its request lock.
pub struct Scheduler {
    rings: Box<[ReadyRing]>,
    sleeping: TaskHeap<ByWakeTime>,
}

impl Scheduler {
    /// Create a scheduler with `levels` priority levels, able to track up
    /// to `tasks` tasks. The sleeping queue is sized to the full task count
    /// so that no legal schedule can overflow it.
    pub fn new(levels: usize, tasks: usize) -> Self {
        let mut rings = Vec::with_capacity(levels);
        for _ in 0..levels {
            rings.push(ReadyRing::new());
        }
        Self {
            rings: rings.into_boxed_slice(),
            sleeping: TaskHeap::with_capacity(tasks),
        }
    }

    /// Number of priority levels.
    pub fn levels(&self) -> usize {
        self.rings.len()
    }

    /// Admit a task to the ready ring of its current priority level.
    pub(crate) fn admit(&mut self, table: &TaskTable, id: TaskId) {
        let level = table.get(id).priority() as usize;
        self.rings[level].add(table, id);
        table.get(id).set_location(Location::Ready);
    }

    /// Remove a ready task from its ring.
    pub(crate) fn deschedule(&mut self, table: &TaskTable, id: TaskId) {
        debug_assert_eq!(table.get(id).location(), Location::Ready);
        let level = table.get(id).priority() as usize;
        self.rings[level].remove(table, id);
    }

    /// Move a ready task into a timed sleep until `wake`.
    pub(crate) fn sleep(&mut self, table: &TaskTable, id: TaskId, wake: u32) {
        let tcb = table.get(id);
        tcb.set_wake(wake);
        tcb.set_state_flags(state::SLEEP);
        self.deschedule(table, id);
        tcb.set_location(Location::Sleeping);
        if self.sleeping.insert(table, id).is_err() {
            // The heap is sized to the arena, so this cannot fire from any
            // legal schedule; reaching it means the system was mis-built.
            panic!("sleeping queue overflow");
        }
        trace!("task {} sleeping until tick {}", id, wake);
    }

    /// The scheduling decision.
    ///
    /// Wakes every sleeper whose wake tick has been reached, drains the
    /// pending list into the rings, then picks the next task: highest
    /// non-empty level, round-robin within it. Falls back to the idle task.
    pub(crate) fn schedule_next(
        &mut self,
        table: &TaskTable,
        pending: &TaskList,
        now: u32,
    ) -> TaskId {
        while let Some(id) = self.sleeping.peek() {
            if !deadline_reached(table.get(id).wake(), now) {
                break;
            }
            let id = match self.sleeping.extract(table) {
                Some(id) => id,
                None => break,
            };
            trace!("task {} woken at tick {}", id, now);
            self.admit(table, id);
        }
        while let Some(id) = pending.pop_head(table) {
            self.admit(table, id);
        }
        for ring in self.rings.iter_mut() {
            if !ring.is_empty() {
                let id = ring.advance(table);
                table
                    .get(id)
                    .clear_state_flags(state::YIELD | state::SLEEP);
                return id;
            }
        }
        TaskId::IDLE
    }
}
