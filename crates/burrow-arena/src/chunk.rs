//! Fixed-size memory chunks.
//!
//! A [`Chunk`] is a contiguous run of atomic words with bump allocation, a
//! [`PointerBitmap`] and a high-water mark. Chunks are shared through `Arc`
//! between the owning arena, the runtime's scan set, the quarantine list,
//! the reuse pool and outstanding handles; which of those currently *owns*
//! the chunk is tracked by [`ChunkState`].

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use burrow_core::{Addr, ChunkId, OutOfMemory, Tracer, TypeLayout, Word, WordBuf, WORD_BYTES};
use parking_lot::RwLock;

use crate::bitmap::PointerBitmap;

/// Life-cycle state of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkState {
    /// Owned by an arena. Bitmap is authoritative.
    Active = 0,
    /// Released, waiting for collector cycles. Bitmap is frozen.
    Quarantined = 1,
    /// Cleared and parked in the reuse pool.
    Pooled = 2,
    /// Handed back to the heap. Terminal.
    Released = 3,
}

impl ChunkState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Active,
            1 => Self::Quarantined,
            2 => Self::Pooled,
            _ => Self::Released,
        }
    }
}

/// Whether a chunk is regular-sized (poolable) or a dedicated oversized
/// region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// Exactly one configured chunk size.
    Regular,
    /// Rounded-up region for a single large allocation. Never pooled.
    Oversized,
}

/// A bump-allocated region of atomic words with a pointer bitmap.
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    kind: ChunkKind,
    words: WordBuf,
    bitmap: PointerBitmap,
    /// High-water mark in words. Published with `Release` after the words
    /// below it are zeroed and their bitmap bits are set.
    used: AtomicUsize,
    state: AtomicU8,
    /// Incremented every time the chunk is handed to an arena.
    lease: AtomicU64,
    /// Held shared by handle accesses, exclusively by state transitions.
    tenure: RwLock<()>,
}

impl Chunk {
    /// Allocate a zeroed, pooled chunk of `words` words.
    pub fn new(words: usize, kind: ChunkKind) -> Result<Self, OutOfMemory> {
        Ok(Self {
            id: ChunkId::next(),
            kind,
            words: WordBuf::zeroed(words)?,
            bitmap: PointerBitmap::new(words)?,
            used: AtomicUsize::new(0),
            state: AtomicU8::new(ChunkState::Pooled as u8),
            lease: AtomicU64::new(0),
            tenure: RwLock::new(()),
        })
    }

    /// Process-unique id.
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Regular or oversized.
    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    /// Current life-cycle state.
    pub fn state(&self) -> ChunkState {
        ChunkState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Current lease number.
    pub fn lease(&self) -> u64 {
        self.lease.load(Ordering::Acquire)
    }

    /// The chunk's pointer bitmap.
    pub fn bitmap(&self) -> &PointerBitmap {
        &self.bitmap
    }

    /// Address of word 0.
    pub fn base(&self) -> Addr {
        self.words.addr()
    }

    /// Address of word `offset`.
    pub fn addr_of(&self, offset: usize) -> Addr {
        self.base().add_words(offset)
    }

    /// Whether `addr` points into this chunk.
    pub fn contains(&self, addr: Addr) -> bool {
        self.words.contains(addr)
    }

    /// Capacity in words.
    pub fn capacity_words(&self) -> usize {
        self.words.len()
    }

    /// Capacity in bytes.
    pub fn size_bytes(&self) -> usize {
        self.words.size_bytes()
    }

    /// Words handed out so far.
    pub fn used_words(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Words still free.
    pub fn remaining_words(&self) -> usize {
        self.capacity_words() - self.used_words()
    }

    /// Bump-allocate `count` values of `layout`, returning the word offset.
    ///
    /// Only the owning arena calls this, under its own lock. The region is
    /// zeroed, then its bitmap bits are set, then the new high-water mark
    /// is published.
    pub fn try_alloc(&self, layout: &TypeLayout, count: usize) -> Option<usize> {
        let words = layout.words().checked_mul(count)?;
        let start = self.used.load(Ordering::Relaxed);
        let end = start.checked_add(words)?;
        if end > self.capacity_words() {
            return None;
        }
        self.words.fill_zero(start..end);
        self.bitmap.mark_region(start, layout, count);
        self.used.store(end, Ordering::Release);
        Some(start)
    }

    /// Visit every non-null pointer word below the high-water mark.
    pub fn scan(&self, tracer: &mut dyn Tracer) {
        let limit = self.used.load(Ordering::Acquire);
        self.bitmap.for_each_pointer(limit, |i| {
            let w = self.words.load(i);
            if w != 0 {
                tracer.visit(Addr(w));
            }
        });
    }

    /// Run `f` only if the chunk is still active under `lease`. State
    /// transitions wait for `f` to return.
    pub(crate) fn with_tenure<R>(&self, lease: u64, f: impl FnOnce(&Self) -> R) -> Option<R> {
        let _guard = self.tenure.read();
        if self.state() == ChunkState::Active && self.lease() == lease {
            Some(f(self))
        } else {
            None
        }
    }

    /// Read words `offset..offset + out.len()`.
    pub(crate) fn read_words(&self, offset: usize, out: &mut [Word]) {
        self.words.read_into(offset, out);
    }

    /// Word `index`.
    pub(crate) fn word(&self, index: usize) -> Word {
        self.words.load(index)
    }

    /// Write `src` at `offset`.
    pub(crate) fn write_words(&self, offset: usize, src: &[Word]) {
        self.words.write_from(offset, src);
    }

    /// Move to `state`, waiting for in-flight handle accesses.
    pub(crate) fn set_state(&self, state: ChunkState) {
        let _guard = self.tenure.write();
        self.state.store(state as u8, Ordering::Release);
    }

    /// Hand the chunk to a new arena. Returns the new lease.
    pub(crate) fn activate(&self) -> u64 {
        let _guard = self.tenure.write();
        let lease = self.lease.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.store(ChunkState::Active as u8, Ordering::Release);
        lease
    }

    /// Forget all allocations: clear the bitmap, then rewind the bump
    /// pointer. Stale word contents are zeroed lazily by `try_alloc`.
    pub(crate) fn reset_for_reuse(&self) {
        self.bitmap.clear();
        self.used.store(0, Ordering::Release);
    }
}

/// Words needed for `bytes` bytes.
pub(crate) fn words_for(bytes: usize) -> usize {
    bytes.div_ceil(WORD_BYTES)
}
