//! Heap error types.

use burrow_core::{Addr, OutOfMemory};
use thiserror::Error;

/// Errors from [`Heap`](crate::Heap) operations.
#[derive(Error, Debug)]
pub enum HeapError {
    /// The object could not be allocated.
    #[error("heap allocation failed: {0}")]
    OutOfMemory(#[from] OutOfMemory),

    /// The address does not point into any live heap object.
    #[error("no live heap object at {0}")]
    DanglingAddress(Addr),

    /// The requested type does not fit the object at that address.
    #[error("{expected} words requested at {addr}, object has {found} from there")]
    LayoutMismatch {
        /// The address looked up.
        addr: Addr,
        /// Words the requested type needs.
        expected: usize,
        /// Words available from `addr` to the end of the object.
        found: usize,
    },

    /// The operation needs real storage, but the value is zero-sized.
    #[error("zero-sized values have no heap object")]
    ZeroSized,

    /// A collector thread could not be started.
    #[error("failed to spawn collector thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Rejected [`GcConfig`](crate::GcConfig).
    #[error("invalid heap config: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
}
