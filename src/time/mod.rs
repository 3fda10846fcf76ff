//! Tick counting.
//!
//! The kernel's only time source is a word-wide tick counter advanced by the
//! embedder's periodic timer interrupt. The count wraps modulo 2^32;
//! comparisons are wrap-aware, so deadlines work across the wrap as long as
//! sleeps stay well under 2^31 ticks.

use portable_atomic::{AtomicU32, Ordering};

/// Monotonic (modulo 2^32) tick counter.
pub struct TickCounter {
    ticks: AtomicU32,
}

impl TickCounter {
    /// Create a counter starting at zero.
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
        }
    }

    /// Advance the counter. Called from the timer interrupt handler only.
    pub fn increment(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    /// Ticks elapsed since start, modulo 2^32.
    pub fn elapsed(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap-aware deadline test: true once `now` has reached `deadline`.
pub(crate) fn deadline_reached(deadline: u32, now: u32) -> bool {
    deadline.wrapping_sub(now) as i32 <= 0
}

/// Wrap-aware ordering of two deadlines: true when `a` falls due before `b`.
pub(crate) fn deadline_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}
