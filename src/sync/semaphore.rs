//! Counting semaphore.
//!
//! Tokens live in a single atomic word mutated with compare-and-swap retry
//! loops, and the waiter queue is the lock-free task list, so release is
//! safe straight from an interrupt handler. Waiters are woken oldest-first
//! (tail extraction).

use portable_atomic::{AtomicU32, Ordering};

use crate::queue::TaskList;

/// Counting lock with FIFO waiters.
pub struct Semaphore {
    /// Remaining concurrent permits.
    tokens: AtomicU32,
    /// Bumped on every release; waiters use it to detect a release racing
    /// their decision to block.
    generation: AtomicU32,
    /// Blocked requesters, consumed oldest first.
    pub(crate) waiters: TaskList,
}

impl Semaphore {
    /// Create a semaphore holding `tokens` permits.
    pub const fn new(tokens: u32) -> Self {
        Self {
            tokens: AtomicU32::new(tokens),
            generation: AtomicU32::new(0),
            waiters: TaskList::new(),
        }
    }

    /// Remaining permits at this instant.
    pub fn tokens(&self) -> u32 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Take one token if any remain. Retry loop on the token word; a
    /// concurrent taker fails the exchange and the fresh count decides
    /// again.
    pub(crate) fn try_take_token(&self) -> bool {
        loop {
            let tokens = self.tokens.load(Ordering::Acquire);
            if tokens == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange_weak(tokens, tokens - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Return one token.
    pub(crate) fn add_token(&self) {
        self.tokens.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_run_out_and_return() {
        let sem = Semaphore::new(2);
        assert!(sem.try_take_token());
        assert!(sem.try_take_token());
        assert!(!sem.try_take_token());
        sem.add_token();
        assert_eq!(sem.tokens(), 1);
        assert!(sem.try_take_token());
    }
}
