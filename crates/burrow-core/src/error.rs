//! Error types shared by the arena and the reference heap.

use std::error::Error;
use std::fmt;

/// Backing storage could not be obtained.
///
/// Returned when the system allocator refuses a request, or when a
/// configured byte budget (`limit`) would be exceeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutOfMemory {
    /// Size of the failed request in bytes.
    pub requested: usize,
    /// The budget that was hit, if the failure came from a configured limit.
    pub limit: Option<usize>,
}

impl OutOfMemory {
    /// The system allocator refused a request of `requested` bytes.
    pub fn system(requested: usize) -> Self {
        Self {
            requested,
            limit: None,
        }
    }

    /// A request of `requested` bytes would exceed `limit`.
    pub fn over_budget(requested: usize, limit: usize) -> Self {
        Self {
            requested,
            limit: Some(limit),
        }
    }
}

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out of memory: requested {} bytes", self.requested)?;
        if let Some(limit) = self.limit {
            write!(f, " (limit {limit} bytes)")?;
        }
        Ok(())
    }
}

impl Error for OutOfMemory {}
