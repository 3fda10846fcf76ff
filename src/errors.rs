//! Error handling for kernel operations.
//!
//! The kernel has a deliberately small failure surface: most faults are
//! prevented by invariants, resolved by an internal retry, or fatal to the
//! whole system. The variants here name the conditions that remain.

use core::fmt;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors that kernel operations can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Extract or peek on an empty heap or list.
    ///
    /// Internal callers only extract after checking non-emptiness, so this
    /// never reaches application code.
    EmptyCollection,
    /// A fixed-capacity structure is full. Carries the capacity that was
    /// exceeded. Queue sizes are fixed when the kernel is built, so this
    /// indicates a sizing defect rather than a recoverable condition.
    CapacityExceeded(usize),
    /// An operation that only a specific task may perform was attempted by
    /// another, e.g. releasing a mutex the caller does not own. The
    /// operation itself is a silent no-op; this variant names the condition
    /// for diagnostics and tests.
    ProtocolViolation,
}

impl KernelError {
    /// Whether this error indicates a build-time sizing defect that the
    /// running system cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KernelError::CapacityExceeded(_))
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::EmptyCollection => write!(f, "extract from an empty collection"),
            KernelError::CapacityExceeded(cap) => {
                write!(f, "fixed capacity of {} exceeded", cap)
            }
            KernelError::ProtocolViolation => write!(f, "operation violates ownership protocol"),
        }
    }
}
