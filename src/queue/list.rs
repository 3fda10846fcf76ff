//! Lock-free singly-linked task list.
//!
//! A wait-free-on-average stack over the task arena, safe to use from task
//! context and interrupt context at the same time without masking
//! interrupts. The head is a single atomic word holding a task index; the
//! chain threads through each task's `next` link. Used for the scheduler's
//! pending list, for semaphore waiter queues (FIFO via [`pop_tail`]) and for
//! the global notification wait list.
//!
//! [`pop_tail`]: TaskList::pop_tail

use portable_atomic::{AtomicU32, Ordering};

use crate::task::{TaskId, TaskTable, NO_TASK};

/// Lock-free list of tasks. Never blocks, never allocates.
pub struct TaskList {
    head: AtomicU32,
}

impl TaskList {
    /// Create an empty list.
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(NO_TASK),
        }
    }

    /// Whether the list is empty at this instant.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == NO_TASK
    }

    /// Push a task onto the head of the list.
    ///
    /// Retry loop: read the head, point the task's link at it, then attempt
    /// to swing the head over; any concurrent mutation fails the exchange
    /// and the loop starts over on the fresh head.
    pub fn push_head(&self, table: &TaskTable, id: TaskId) {
        loop {
            let head = self.head.load(Ordering::Acquire);
            table.get(id).set_next_link(head);
            if self
                .head
                .compare_exchange_weak(head, id.0, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Pop the most recently pushed task, or `None` when empty.
    pub fn pop_head(&self, table: &TaskTable) -> Option<TaskId> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == NO_TASK {
                return None;
            }
            let next = table.raw(head).next_link();
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(TaskId(head));
            }
        }
    }

    /// Pop the oldest task (FIFO extraction), or `None` when empty.
    ///
    /// Walks from the head to the last node. A single-node list is emptied
    /// by clearing the head; otherwise the predecessor's link is cleared.
    /// Either exchange failing means the list changed under the walk, which
    /// restarts from the (possibly new) head.
    pub fn pop_tail(&self, table: &TaskTable) -> Option<TaskId> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == NO_TASK {
                return None;
            }
            let mut prev = NO_TASK;
            let mut current = head;
            loop {
                let next = table.raw(current).next_link();
                if next == NO_TASK {
                    break;
                }
                prev = current;
                current = next;
            }
            if prev == NO_TASK {
                // Sole node in the list.
                if self
                    .head
                    .compare_exchange(head, NO_TASK, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Some(TaskId(current));
                }
            } else if table.raw(prev).cas_next_link(current, NO_TASK) {
                return Some(TaskId(current));
            }
        }
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}
