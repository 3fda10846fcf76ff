#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Preemptive priority-based task kernel for single-core microcontrollers.
//!
//! This library multiplexes one CPU among independently-stacked tasks and
//! provides the blocking primitives they coordinate with: a recursive mutex
//! with priority inheritance, a counting semaphore, timed sleep and a
//! global wait/notify channel. Kernel state stays consistent when it is
//! mutated concurrently from task context, from the periodic timer
//! interrupt and from other interrupt handlers releasing a semaphore.
//!
//! # Architecture
//!
//! The library is organized around a few key pieces:
//! - A fixed task arena with enum-tagged queue membership per task
//! - One round-robin ready ring per priority level
//! - A binary heap of sleeping tasks keyed by wake tick
//! - Lock-free hand-off lists between interrupt and task context
//! - Compare-and-swap ownership words for the mutex and semaphore
//!
//! The trap and context-switch mechanism is not part of this crate: it is
//! abstracted behind the [`Arch`] trait, which the embedder implements for
//! the target's privilege-transition model.
//!
//! # Quick Start
//!
//! ```ignore
//! use preemptive_kernel::{Arch, Kernel};
//! use spin::Lazy;
//!
//! static KERNEL: Lazy<Kernel<PortArch>> = Lazy::new(|| Kernel::new(4, 16));
//!
//! fn kernel_main() {
//!     let worker = KERNEL
//!         .initialise_task(stack_top(), worker_entry, 0, 1)
//!         .expect("task arena full");
//!     KERNEL.register_task(worker);
//!     // The port's trap handler now drives KERNEL.schedule_next() and
//!     // context-switches to whatever it returns.
//! }
//! ```
//!
//! # Features
//!
//! - `std-shim`: Enable compatibility layer for testing on host

// Core modules
pub mod arch;
pub mod errors;
pub mod kernel;
pub mod queue;
pub mod sched;
pub mod sync;
pub mod task;
pub mod time;

#[cfg(test)]
mod tests;

#[cfg(test)]
extern crate std;

extern crate alloc;

// Panic handler for bare-metal
#[cfg(all(not(test), not(feature = "std-shim")))]
use core::panic::PanicInfo;

#[cfg(all(not(test), not(feature = "std-shim")))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    // On panic, halt; the embedder's watchdog or debugger takes it from
    // here.
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, NoOpArch, TaskEntry};

// Kernel
pub use kernel::{get_global_kernel, yield_current, Kernel};

// Tasks
pub use task::{Location, TaskId, TaskTable, Tcb};

// Queues
pub use queue::{TaskHeap, TaskList};

// Synchronization
pub use sync::{Mutex, Semaphore};

// Time
pub use time::TickCounter;

// Errors
pub use errors::{KernelError, KernelResult};
