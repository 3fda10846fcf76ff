//! Blocking synchronization primitives: recursive priority-inheritance
//! mutex and counting semaphore.

pub mod mutex;
pub mod semaphore;

pub use mutex::Mutex;
pub use semaphore::Semaphore;
