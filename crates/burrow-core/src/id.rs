//! Strongly-typed addresses, identifiers and the collector cycle counter.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A machine word. Pointer words hold an [`Addr`]; scalar words hold
/// arbitrary bits the collector never interprets.
pub type Word = usize;

/// Size of a [`Word`] in bytes.
pub const WORD_BYTES: usize = std::mem::size_of::<Word>();

/// Backing storage for the zero-size sentinel. Never read or written.
static ZERO_BASE: AtomicUsize = AtomicUsize::new(0);

/// The numeric address of a word in managed memory.
///
/// Addresses are plain integers: holding an `Addr` does not keep anything
/// alive. Only addresses stored in pointer-typed words (or registered as
/// roots) are visible to the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub usize);

impl Addr {
    /// The null address. Never traced.
    pub const NULL: Addr = Addr(0);

    /// The shared address handed out for every zero-sized allocation.
    ///
    /// All zero-sized values, from any arena or heap, alias this address.
    /// It must never be dereferenced.
    pub fn zero_base() -> Addr {
        Addr(&ZERO_BASE as *const AtomicUsize as usize)
    }

    /// Whether this is [`Addr::NULL`].
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The address `words` words past this one.
    pub fn add_words(self, words: usize) -> Addr {
        Addr(self.0 + words * WORD_BYTES)
    }

    /// The address `bytes` bytes past this one.
    pub fn add_bytes(self, bytes: usize) -> Addr {
        Addr(self.0 + bytes)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<Word> for Addr {
    fn from(w: Word) -> Self {
        Self(w)
    }
}

/// Number of collector cycles that have fully completed.
///
/// Incremented by the collector after sweep termination. Quarantine
/// entries are stamped with the value current at release time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(pub u64);

impl CycleId {
    /// The cycle id `n` completions after this one.
    pub fn after(self, n: u64) -> CycleId {
        CycleId(self.0.saturating_add(n))
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CycleId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Counter for unique [`ArenaId`] allocation.
static ARENA_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an arena, used in errors and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(u64);

impl ArenaId {
    /// Allocate a fresh, unique arena ID. Thread-safe.
    pub fn next() -> Self {
        Self(ARENA_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arena#{}", self.0)
    }
}

/// Counter for unique [`ChunkId`] allocation.
static CHUNK_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a chunk.
///
/// Stable across the chunk's whole life cycle, including reuse by other
/// arenas; the per-tenure identity is the chunk's lease instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Allocate a fresh, unique chunk ID. Thread-safe.
    pub fn next() -> Self {
        Self(CHUNK_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_base_is_stable_and_non_null() {
        assert_eq!(Addr::zero_base(), Addr::zero_base());
        assert!(!Addr::zero_base().is_null());
    }

    #[test]
    fn add_words_scales_by_word_size() {
        assert_eq!(Addr(0x1000).add_words(3), Addr(0x1000 + 3 * WORD_BYTES));
        assert_eq!(Addr(0x1000).add_bytes(124), Addr(0x1000 + 124));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ArenaId::next(), ArenaId::next());
        assert_ne!(ChunkId::next(), ChunkId::next());
    }

    #[test]
    fn cycle_after_saturates() {
        assert_eq!(CycleId(3).after(1), CycleId(4));
        assert_eq!(CycleId(u64::MAX).after(1), CycleId(u64::MAX));
    }
}
