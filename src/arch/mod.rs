//! Architecture abstraction for the trap and context-switch mechanism.
//!
//! The kernel never saves or restores register state itself. Preparing a
//! task's first stack frame, switching register files and raising the
//! deferred reschedule interrupt all live behind the [`Arch`] trait, so the
//! scheduling logic is portable across targets with different trap models.

/// Entry function type for tasks: receives the word-sized argument given at
/// task initialisation.
pub type TaskEntry = fn(usize);

/// Architecture abstraction trait.
///
/// Implementations wrap the target's trap mechanism: on Cortex-M this is
/// SVC/PendSV, on other cores whatever pair of synchronous call and
/// lowest-priority software interrupt the platform provides.
pub trait Arch {
    /// Architecture-specific saved register state.
    ///
    /// The kernel treats this as opaque; only the trap handler reads or
    /// writes it during a context switch.
    type SavedContext: Send + Sync + Default;

    /// Prepare the initial stack frame for a task.
    ///
    /// Builds a frame at `stack_top` (stacks are full-descending, so the
    /// frame grows downwards) such that the first dispatch of the task
    /// begins execution at `entry(arg)`, and arranges for the kernel's
    /// task-exit request to run if `entry` ever returns. Returns the
    /// resulting stack pointer for the task control block.
    fn initial_stack(stack_top: usize, entry: TaskEntry, arg: usize) -> usize;

    /// Switch from one saved context to another.
    ///
    /// Called by the embedder's trap handler after the scheduler has picked
    /// the next task; never called by the kernel itself.
    ///
    /// # Safety
    ///
    /// - `prev` and `next` must point to valid, properly aligned contexts
    ///   that stay alive for the duration of the call.
    /// - Must be called with the reschedule interrupt masked.
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Request a reschedule.
    ///
    /// The request is deferred and coalesced: the target's lowest-priority
    /// software interrupt runs the scheduler once all other interrupts have
    /// retired, however many times this was called in between.
    fn request_reschedule();

    /// Whether the current execution context is an interrupt handler.
    ///
    /// Release paths use this to decide between a direct reschedule request
    /// and a task-context yield.
    fn in_interrupt_context() -> bool;

    /// Enable interrupt delivery on the current CPU.
    fn enable_interrupts();

    /// Disable interrupt delivery on the current CPU.
    fn disable_interrupts();
}

/// A no-op architecture implementation for host testing.
///
/// Reschedule requests are counted instead of raised and the
/// interrupt-context flag can be set by the test harness, so scheduling
/// decisions can be driven and observed deterministically from `cargo test`.
pub struct NoOpArch;

use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

static RESCHEDULE_REQUESTS: AtomicUsize = AtomicUsize::new(0);
static INTERRUPT_CONTEXT: AtomicBool = AtomicBool::new(false);

impl NoOpArch {
    /// Number of reschedule requests issued since the last [`reset`].
    ///
    /// [`reset`]: NoOpArch::reset
    pub fn reschedule_requests() -> usize {
        RESCHEDULE_REQUESTS.load(Ordering::Acquire)
    }

    /// Simulate entering or leaving an interrupt handler.
    pub fn set_interrupt_context(active: bool) {
        INTERRUPT_CONTEXT.store(active, Ordering::Release);
    }

    /// Clear the recorded requests and the interrupt-context flag.
    pub fn reset() {
        RESCHEDULE_REQUESTS.store(0, Ordering::Release);
        INTERRUPT_CONTEXT.store(false, Ordering::Release);
    }
}

impl Arch for NoOpArch {
    type SavedContext = ();

    fn initial_stack(stack_top: usize, _entry: TaskEntry, _arg: usize) -> usize {
        // No frame to build on the host; the cursor is returned unchanged.
        stack_top
    }

    unsafe fn context_switch(_prev: *mut Self::SavedContext, _next: *const Self::SavedContext) {}

    fn request_reschedule() {
        RESCHEDULE_REQUESTS.fetch_add(1, Ordering::AcqRel);
    }

    fn in_interrupt_context() -> bool {
        INTERRUPT_CONTEXT.load(Ordering::Acquire)
    }

    fn enable_interrupts() {}

    fn disable_interrupts() {}
}
