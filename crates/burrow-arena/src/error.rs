//! Arena-specific error types.

use burrow_core::{ArenaId, OutOfMemory};
use thiserror::Error;

/// Errors that can occur during arena operations.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// A chunk could not be obtained from the heap or the configured budget.
    #[error("arena allocation failed: {0}")]
    OutOfMemory(#[from] OutOfMemory),

    /// The arena, or the arena a handle points into, has been freed.
    #[error("{arena} has been freed")]
    Freed {
        /// The arena that owned the memory.
        arena: ArenaId,
    },

    /// `free` was called on an arena that was already freed.
    #[error("{arena} freed twice")]
    DoubleFree {
        /// The arena.
        arena: ArenaId,
    },

    /// A slice element index at or past the slice's length.
    #[error("index {index} out of bounds for arena slice of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Slice length.
        len: usize,
    },

    /// A bulk copy whose source length differs from the slice's.
    #[error("source of {found} elements copied into arena slice of length {expected}")]
    LengthMismatch {
        /// Slice length.
        expected: usize,
        /// Source length.
        found: usize,
    },

    /// A slice length whose size in words overflows `usize`.
    #[error("slice of {len} elements of {element_words} words overflows")]
    LengthOverflow {
        /// Requested element count.
        len: usize,
        /// Words per element.
        element_words: usize,
    },

    /// Rejected [`ArenaConfig`](crate::ArenaConfig).
    #[error("invalid arena config: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
}
