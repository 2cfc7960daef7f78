//! Arena configuration parameters.

use burrow_core::WORD_BYTES;

use crate::error::ArenaError;

/// Configuration shared by every arena of one [`ArenaRuntime`](crate::ArenaRuntime).
///
/// Validated when the runtime is built; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Size of each regular chunk in bytes.
    ///
    /// Default: 8 MiB. Must be a power of two and at least
    /// [`MIN_CHUNK_BYTES`](Self::MIN_CHUNK_BYTES).
    pub chunk_bytes: usize,

    /// Maximum number of cleared chunks kept for reuse. Chunks released
    /// while the pool is full go back to the heap.
    pub pool_capacity: usize,

    /// Number of collector cycles that must complete after a chunk is
    /// released before its bitmap may be cleared and the chunk reused.
    /// At least 1.
    pub quarantine_cycles: u64,

    /// Optional cap on chunk memory not yet returned to the heap (active,
    /// quarantined and pooled). `None` means unbounded.
    pub max_live_bytes: Option<usize>,
}

impl ArenaConfig {
    /// Default chunk size: 8 MiB.
    pub const DEFAULT_CHUNK_BYTES: usize = 8 << 20;

    /// Smallest accepted chunk size.
    pub const MIN_CHUNK_BYTES: usize = 512;

    /// Default reuse-pool bound.
    pub const DEFAULT_POOL_CAPACITY: usize = 64;

    /// Default quarantine length in cycles.
    pub const DEFAULT_QUARANTINE_CYCLES: u64 = 1;

    /// Defaults for everything.
    pub fn new() -> Self {
        Self {
            chunk_bytes: Self::DEFAULT_CHUNK_BYTES,
            pool_capacity: Self::DEFAULT_POOL_CAPACITY,
            quarantine_cycles: Self::DEFAULT_QUARANTINE_CYCLES,
            max_live_bytes: None,
        }
    }

    /// Same config with a different chunk size.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    /// Chunk size in words.
    pub fn chunk_words(&self) -> usize {
        self.chunk_bytes / WORD_BYTES
    }

    /// Check every field, reporting the first violation.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if !self.chunk_bytes.is_power_of_two() {
            return Err(ArenaError::InvalidConfig {
                reason: format!("chunk_bytes {} is not a power of two", self.chunk_bytes),
            });
        }
        if self.chunk_bytes < Self::MIN_CHUNK_BYTES {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "chunk_bytes {} is below the minimum of {}",
                    self.chunk_bytes,
                    Self::MIN_CHUNK_BYTES
                ),
            });
        }
        if self.quarantine_cycles == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "quarantine_cycles must be at least 1".into(),
            });
        }
        if let Some(limit) = self.max_live_bytes {
            if limit < self.chunk_bytes {
                return Err(ArenaError::InvalidConfig {
                    reason: format!(
                        "max_live_bytes {limit} cannot hold a single {} byte chunk",
                        self.chunk_bytes
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new()
    }
}
