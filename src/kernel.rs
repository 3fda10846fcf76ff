//! Kernel façade tying the scheduler, task arena and primitives together.
//!
//! A [`Kernel`] owns every piece of scheduler state. Task-facing requests
//! (sleep, yield, acquire, release, wait, exit) mutate that state under a
//! single request lock, the software equivalent of running a privileged
//! kernel request with rescheduling deferred, and then ask the
//! architecture layer for a deferred reschedule. The only state touched
//! outside the lock is the deliberately lock-free subset: the pending and
//! waiter lists, mutex ownership words and semaphore tokens, which
//! interrupt handlers are allowed to hit at any point.

use core::marker::PhantomData;

use log::{debug, trace};
use portable_atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};
use spin::Mutex as SpinMutex;

use crate::arch::{Arch, TaskEntry};
use crate::errors::{KernelError, KernelResult};
use crate::queue::TaskList;
use crate::sched::Scheduler;
use crate::sync::{Mutex, Semaphore};
use crate::task::{state, Location, TaskId, TaskTable, Tcb};
use crate::time::TickCounter;

/// Global kernel reference for interrupt handlers.
static GLOBAL_KERNEL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// The task kernel.
///
/// # Type Parameters
///
/// * `A` - Architecture implementation providing the trap and
///   context-switch mechanism.
pub struct Kernel<A: Arch> {
    /// Fixed arena of task control blocks. Slot 0 is the idle task.
    table: TaskTable,
    /// Ready rings and sleeping queue, behind the kernel request lock.
    sched: SpinMutex<Scheduler>,
    /// Tasks handed back to the scheduler from another context. Drained
    /// only by the scheduling decision.
    pending: TaskList,
    /// Tasks blocked on the global notification counter.
    wait_list: TaskList,
    /// Global notification counter for [`wait`]/[`notify_all`].
    ///
    /// [`wait`]: Kernel::wait
    /// [`notify_all`]: Kernel::notify_all
    notifications: AtomicU32,
    /// System tick counter, advanced by the timer interrupt via [`tick`].
    ///
    /// [`tick`]: Kernel::tick
    ticks: TickCounter,
    /// The task selected by the most recent scheduling decision.
    current: AtomicU32,
    /// Next free arena slot.
    next_slot: AtomicUsize,
    /// Number of priority levels.
    levels: usize,
    /// Architecture marker (zero-sized).
    _arch: PhantomData<A>,
}

impl<A: Arch> Kernel<A> {
    /// Create a kernel with `levels` priority levels and room for
    /// `max_tasks` tasks beyond the reserved idle task.
    ///
    /// External priorities are 1 (most urgent) through `levels`.
    pub fn new(levels: usize, max_tasks: usize) -> Self {
        assert!(levels > 0 && levels <= u8::MAX as usize);
        let table = TaskTable::new(max_tasks);
        // The idle task never enters a queue; its level is the floor of the
        // priority space.
        let idle = table.get(TaskId::IDLE);
        idle.set_priority(levels as u8 - 1);
        idle.set_original_priority(levels as u8 - 1);
        Self {
            table,
            sched: SpinMutex::new(Scheduler::new(levels, max_tasks)),
            pending: TaskList::new(),
            wait_list: TaskList::new(),
            notifications: AtomicU32::new(0),
            ticks: TickCounter::new(),
            current: AtomicU32::new(TaskId::IDLE.0),
            next_slot: AtomicUsize::new(1), // slot 0 is the idle task
            levels,
            _arch: PhantomData,
        }
    }

    /// The control block of a task, for the context-switch mechanism and
    /// diagnostics.
    pub fn task(&self, id: TaskId) -> &Tcb {
        self.table.get(id)
    }

    /// The task selected by the most recent scheduling decision.
    pub fn current_task(&self) -> TaskId {
        TaskId(self.current.load(Ordering::Acquire))
    }

    /// Ticks elapsed since start, modulo 2^32.
    pub fn elapsed_ticks(&self) -> u32 {
        self.ticks.elapsed()
    }

    /// Advance the tick counter and request a reschedule. Called from the
    /// periodic timer interrupt handler.
    pub fn tick(&self) {
        self.ticks.increment();
        A::request_reschedule();
    }

    /// Prepare a task: claim an arena slot, build the initial stack frame
    /// so the first dispatch begins at `entry(arg)`, and record its
    /// priority.
    ///
    /// `priority` is 1-indexed with 1 the most urgent; zero or out-of-range
    /// values fall back to the lowest level. The task is not runnable until
    /// [`register_task`] admits it.
    ///
    /// [`register_task`]: Kernel::register_task
    pub fn initialise_task(
        &self,
        stack_top: usize,
        entry: TaskEntry,
        arg: usize,
        priority: u8,
    ) -> KernelResult<TaskId> {
        let slot = self.next_slot.fetch_add(1, Ordering::AcqRel);
        if slot >= self.table.capacity() {
            return Err(KernelError::CapacityExceeded(self.table.capacity() - 1));
        }
        let level = if priority == 0 || priority as usize > self.levels {
            self.levels as u8 - 1
        } else {
            priority - 1
        };
        let id = TaskId(slot as u32);
        let tcb = self.table.get(id);
        tcb.set_sp(A::initial_stack(stack_top, entry, arg));
        tcb.set_priority(level);
        tcb.set_original_priority(level);
        trace!("task {} initialised at level {}", id, level);
        Ok(id)
    }

    /// Admit an initialised task to the ready ring of its priority level.
    pub fn register_task(&self, id: TaskId) {
        debug_assert!(!id.is_idle());
        debug_assert_eq!(self.table.get(id).location(), Location::None);
        let mut sched = self.sched.lock();
        sched.admit(&self.table, id);
        drop(sched);
        trace!("task {} registered", id);
    }

    /// The scheduling decision: wake due sleepers, drain the pending list,
    /// then pick the next task to run. Falls back to the idle task.
    ///
    /// Called only by the trap mechanism and the tick handler.
    pub fn schedule_next(&self) -> TaskId {
        let mut sched = self.sched.lock();
        let next = sched.schedule_next(&self.table, &self.pending, self.ticks.elapsed());
        drop(sched);
        self.current.store(next.0, Ordering::Release);
        next
    }

    /// Give up the rest of the current turn. The task stays runnable and
    /// will be selected again in its round-robin order.
    pub fn yield_now(&self) {
        let me = self.current_task();
        if !me.is_idle() {
            self.table.get(me).set_state_flags(state::YIELD);
        }
        A::request_reschedule();
    }

    /// Put the current task to sleep for `duration` ticks.
    ///
    /// The task is removed from its ready ring and re-admitted by the
    /// scheduler once the tick counter reaches the recorded wake time.
    pub fn sleep(&self, duration: u32) {
        let me = self.current_task();
        if me.is_idle() {
            return;
        }
        let wake = self.ticks.elapsed().wrapping_add(duration);
        let mut sched = self.sched.lock();
        sched.sleep(&self.table, me, wake);
        drop(sched);
        A::request_reschedule();
    }

    /// Remove the current task from the scheduler for good.
    ///
    /// The architecture layer arranges for this to run when a task's entry
    /// function returns; tasks may also call it directly.
    pub fn task_exit(&self) {
        let me = self.current_task();
        if me.is_idle() {
            return;
        }
        let mut sched = self.sched.lock();
        sched.deschedule(&self.table, me);
        self.table.get(me).set_location(Location::None);
        drop(sched);
        debug!("task {} exited", me);
        A::request_reschedule();
    }

    // ------------------------------------------------------------------
    // Mutex requests
    // ------------------------------------------------------------------

    /// Acquire a mutex, blocking until it is held. Reentrant: the owner may
    /// acquire again and must release once per acquisition.
    ///
    /// When the lock is contended the current task is blocked and the
    /// port's reschedule request suspends it; each resumption retries the
    /// claim from the top.
    pub fn mutex_acquire(&self, mutex: &Mutex) {
        let me = self.current_task();
        loop {
            let check = mutex.generation();
            if mutex.claim_or_reenter(me) {
                break;
            }
            self.mutex_wait(mutex, check);
        }
        mutex.increment_recursion();
    }

    /// Block the current task on `mutex` unless the generation counter has
    /// moved past `check`.
    ///
    /// A release between "observed busy" and this point bumps the
    /// generation; in that case the block is skipped so the requester
    /// re-evaluates immediately instead of sleeping past the hand-off.
    pub(crate) fn mutex_wait(&self, mutex: &Mutex, check: u32) {
        let me = self.current_task();
        if me.is_idle() {
            return;
        }
        let mut sched = self.sched.lock();
        if mutex.generation() != check {
            return;
        }
        // The generation is stable under the request lock, so the owner
        // observed busy is still the owner.
        let owner = match mutex.owner() {
            Some(owner) => owner,
            None => return,
        };
        let tcb = self.table.get(me);
        sched.deschedule(&self.table, me);
        tcb.set_location(Location::MutexWait);
        if mutex.waiters.lock().insert(&self.table, me).is_err() {
            // Waiter queues are sized by the embedder; overflow means the
            // system was mis-built.
            panic!("mutex waiter queue overflow");
        }
        // Priority inheritance: lend the owner the requester's urgency so
        // the block is bounded by the owner's remaining critical section.
        let owner_tcb = self.table.get(owner);
        let my_level = tcb.priority();
        if owner_tcb.priority() > my_level {
            debug!("task {} priority boosted to level {}", owner, my_level);
            if owner_tcb.location() == Location::Ready {
                sched.deschedule(&self.table, owner);
                owner_tcb.set_priority(my_level);
                owner_tcb.set_location(Location::Pending);
                self.pending.push_head(&self.table, owner);
            } else {
                owner_tcb.set_priority(my_level);
            }
        }
        drop(sched);
        A::request_reschedule();
    }

    /// Release a mutex held by the current task.
    ///
    /// A release by any other task is a no-op. The final release restores
    /// the owner's original priority, hands the lock's generation forward,
    /// wakes the most urgent waiter, and yields so the waiter is not
    /// outraced by an immediate re-acquisition.
    pub fn mutex_release(&self, mutex: &Mutex) {
        let me = self.current_task();
        if !mutex.is_owned_by(me) {
            return;
        }
        if mutex.decrement_recursion() == 0 {
            let mut sched = self.sched.lock();
            self.restore_priority(&mut sched, me);
            mutex.clear_owner();
            mutex.bump_generation();
            if let Some(waiter) = mutex.waiters.lock().extract(&self.table) {
                self.table.get(waiter).set_location(Location::Pending);
                self.pending.push_head(&self.table, waiter);
            }
            drop(sched);
        }
        self.yield_now();
    }

    /// Undo a priority-inheritance boost once the owner lets go.
    fn restore_priority(&self, sched: &mut Scheduler, id: TaskId) {
        let tcb = self.table.get(id);
        let original = tcb.original_priority();
        if tcb.priority() != original {
            debug!("task {} priority restored to level {}", id, original);
            if tcb.location() == Location::Ready {
                sched.deschedule(&self.table, id);
                tcb.set_priority(original);
                tcb.set_location(Location::Pending);
                self.pending.push_head(&self.table, id);
            } else {
                tcb.set_priority(original);
            }
        }
    }

    // ------------------------------------------------------------------
    // Semaphore requests
    // ------------------------------------------------------------------

    /// Acquire one semaphore token, blocking until one is available.
    pub fn semaphore_acquire(&self, semaphore: &Semaphore) {
        loop {
            let check = semaphore.generation();
            if semaphore.try_take_token() {
                break;
            }
            self.semaphore_wait(semaphore, check);
        }
    }

    /// Block the current task on `semaphore` unless the generation counter
    /// has moved past `check` (same race guard as the mutex path).
    pub(crate) fn semaphore_wait(&self, semaphore: &Semaphore, check: u32) {
        let me = self.current_task();
        if me.is_idle() {
            return;
        }
        let mut sched = self.sched.lock();
        if semaphore.generation() != check {
            return;
        }
        sched.deschedule(&self.table, me);
        self.table.get(me).set_location(Location::SemWait);
        semaphore.waiters.push_head(&self.table, me);
        drop(sched);
        A::request_reschedule();
    }

    /// Return one token and wake the oldest waiter, if any.
    ///
    /// Callable from task or interrupt context: the token word, the waiter
    /// list and the pending list are all lock-free. From an interrupt a
    /// reschedule is requested directly; from a task the caller yields so a
    /// waiter is not outraced in a tight release/acquire loop.
    pub fn semaphore_release(&self, semaphore: &Semaphore) {
        semaphore.add_token();
        semaphore.bump_generation();
        if let Some(waiter) = semaphore.waiters.pop_tail(&self.table) {
            self.table.get(waiter).set_location(Location::Pending);
            self.pending.push_head(&self.table, waiter);
        }
        if A::in_interrupt_context() {
            A::request_reschedule();
        } else {
            self.yield_now();
        }
    }

    // ------------------------------------------------------------------
    // Global wait/notify
    // ------------------------------------------------------------------

    /// The global notification count, used as the check code for [`wait`].
    ///
    /// [`wait`]: Kernel::wait
    pub fn notification_count(&self) -> u32 {
        self.notifications.load(Ordering::Acquire)
    }

    /// Block the current task until the next [`notify_all`], unless the
    /// notification count has already moved past `check`.
    ///
    /// [`notify_all`]: Kernel::notify_all
    pub fn wait(&self, check: u32) {
        let me = self.current_task();
        if me.is_idle() {
            return;
        }
        let mut sched = self.sched.lock();
        if self.notifications.load(Ordering::Acquire) != check {
            return;
        }
        sched.deschedule(&self.table, me);
        self.table.get(me).set_location(Location::NotifyWait);
        self.wait_list.push_head(&self.table, me);
        drop(sched);
        A::request_reschedule();
    }

    /// Wake every task blocked in [`wait`]. Safe from either context: only
    /// the counter and the lock-free lists are touched.
    ///
    /// [`wait`]: Kernel::wait
    pub fn notify_all(&self) {
        self.notifications.fetch_add(1, Ordering::AcqRel);
        while let Some(id) = self.wait_list.pop_head(&self.table) {
            self.table.get(id).set_location(Location::Pending);
            self.pending.push_head(&self.table, id);
        }
    }

    /// Register this kernel as the global kernel for interrupt handlers.
    ///
    /// # Safety
    ///
    /// The kernel must outlive all interrupt handling, and every later
    /// [`get_global_kernel`] call must name the same `A` this kernel was
    /// built with.
    pub unsafe fn register_global(&'static self) {
        GLOBAL_KERNEL.store(self as *const _ as *mut (), Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn set_current(&self, id: TaskId) {
        self.current.store(id.0, Ordering::Release);
    }
}

// Safety: every field is either immutable after construction or accessed
// through atomics and internal locks.
unsafe impl<A: Arch> Send for Kernel<A> {}
unsafe impl<A: Arch> Sync for Kernel<A> {}

/// Get the global kernel reference (for interrupt handlers).
///
/// Returns `None` if no kernel has been registered. `A` must be the type
/// the kernel was registered with.
pub fn get_global_kernel<A: Arch>() -> Option<&'static Kernel<A>> {
    let ptr = GLOBAL_KERNEL.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        // Safety: register_global stored a &'static Kernel<A>; the caller
        // upholds the matching-type requirement documented there.
        Some(unsafe { &*(ptr as *const Kernel<A>) })
    }
}

/// Yield the current task (convenience function).
///
/// This uses the global kernel if registered, otherwise does nothing.
pub fn yield_current<A: Arch + 'static>() {
    if let Some(kernel) = get_global_kernel::<A>() {
        kernel.yield_now();
    }
}
