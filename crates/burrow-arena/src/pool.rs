//! The chunk allocator and its bounded reuse pool.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use burrow_core::{OutOfMemory, WORD_BYTES};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::chunk::{words_for, Chunk, ChunkKind, ChunkState};
use crate::config::ArenaConfig;

/// Allocator counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Chunks obtained fresh from the heap.
    pub fresh_chunks: u64,
    /// Chunks handed out from the reuse pool.
    pub reused_chunks: u64,
    /// Chunks returned to the heap.
    pub returned_chunks: u64,
    /// Bytes of chunk memory not yet returned to the heap.
    pub live_bytes: usize,
    /// Chunks currently parked in the pool.
    pub pooled_chunks: usize,
}

/// Hands out chunks, preferring cleared chunks from the pool.
#[derive(Debug)]
pub struct ChunkAllocator {
    chunk_words: usize,
    pool_capacity: usize,
    max_live_bytes: Option<usize>,
    pool: Mutex<Vec<Arc<Chunk>>>,
    live_bytes: AtomicUsize,
    fresh: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
}

impl ChunkAllocator {
    /// An empty allocator for `config`.
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            chunk_words: config.chunk_words(),
            pool_capacity: config.pool_capacity,
            max_live_bytes: config.max_live_bytes,
            pool: Mutex::new(Vec::with_capacity(config.pool_capacity.min(64))),
            live_bytes: AtomicUsize::new(0),
            fresh: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            returned: AtomicU64::new(0),
        }
    }

    /// Words in a regular chunk.
    pub fn chunk_words(&self) -> usize {
        self.chunk_words
    }

    /// An active regular chunk: pooled if available, else fresh.
    pub fn acquire(&self) -> Result<Arc<Chunk>, OutOfMemory> {
        let pooled = self.pool.lock().pop();
        if let Some(chunk) = pooled {
            debug_assert!(chunk.bitmap().is_clear(), "pooled chunk has pointer bits");
            debug_assert_eq!(chunk.used_words(), 0);
            chunk.activate();
            self.reused.fetch_add(1, Ordering::Relaxed);
            trace!(chunk = %chunk.id(), "reusing pooled chunk");
            return Ok(chunk);
        }
        self.fresh_chunk(self.chunk_words, ChunkKind::Regular)
    }

    /// An active dedicated region of at least `bytes` bytes, rounded up to
    /// whole chunks.
    pub fn acquire_oversized(&self, bytes: usize) -> Result<Arc<Chunk>, OutOfMemory> {
        let chunks = words_for(bytes).div_ceil(self.chunk_words);
        let words = chunks
            .checked_mul(self.chunk_words)
            .ok_or_else(|| OutOfMemory::system(bytes))?;
        self.fresh_chunk(words, ChunkKind::Oversized)
    }

    /// Return a chunk whose quarantine has cleared. Its bitmap must already
    /// be all-scalar. Oversized chunks, and any chunk that does not fit in
    /// the pool, go back to the heap.
    pub fn release_to_pool(&self, chunk: Arc<Chunk>) {
        debug_assert!(chunk.bitmap().is_clear(), "pooling a chunk with pointer bits");
        if chunk.kind() == ChunkKind::Oversized {
            self.release_to_heap(chunk);
            return;
        }
        let mut pool = self.pool.lock();
        if pool.len() < self.pool_capacity {
            chunk.set_state(ChunkState::Pooled);
            trace!(chunk = %chunk.id(), pooled = pool.len() + 1, "chunk pooled");
            pool.push(chunk);
            return;
        }
        drop(pool);
        self.release_to_heap(chunk);
    }

    /// Give a chunk's memory back to the heap. Outstanding handles keep the
    /// allocation itself alive but can no longer access it.
    pub fn release_to_heap(&self, chunk: Arc<Chunk>) {
        chunk.set_state(ChunkState::Released);
        self.live_bytes.fetch_sub(chunk.size_bytes(), Ordering::AcqRel);
        self.returned.fetch_add(1, Ordering::Relaxed);
        debug!(chunk = %chunk.id(), kind = ?chunk.kind(), bytes = chunk.size_bytes(), "chunk returned to heap");
    }

    /// Chunks currently pooled.
    pub fn pooled_chunks(&self) -> usize {
        self.pool.lock().len()
    }

    /// Bytes not yet returned to the heap.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            fresh_chunks: self.fresh.load(Ordering::Relaxed),
            reused_chunks: self.reused.load(Ordering::Relaxed),
            returned_chunks: self.returned.load(Ordering::Relaxed),
            live_bytes: self.live_bytes(),
            pooled_chunks: self.pooled_chunks(),
        }
    }

    fn fresh_chunk(&self, words: usize, kind: ChunkKind) -> Result<Arc<Chunk>, OutOfMemory> {
        let bytes = words
            .checked_mul(WORD_BYTES)
            .ok_or_else(|| OutOfMemory::system(usize::MAX))?;
        self.reserve(bytes)?;
        let chunk = match Chunk::new(words, kind) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
                return Err(e);
            }
        };
        chunk.activate();
        self.fresh.fetch_add(1, Ordering::Relaxed);
        debug!(chunk = %chunk.id(), ?kind, bytes, "fresh chunk allocated");
        Ok(Arc::new(chunk))
    }

    fn reserve(&self, bytes: usize) -> Result<(), OutOfMemory> {
        match self.max_live_bytes {
            None => {
                self.live_bytes.fetch_add(bytes, Ordering::AcqRel);
                Ok(())
            }
            Some(limit) => self
                .live_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                    live.checked_add(bytes).filter(|&total| total <= limit)
                })
                .map(|_| ())
                .map_err(|_| OutOfMemory::over_budget(bytes, limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::TypeLayout;

    fn config(pool_capacity: usize) -> ArenaConfig {
        ArenaConfig {
            pool_capacity,
            ..ArenaConfig::new().with_chunk_bytes(4096)
        }
    }

    fn clear(chunk: &Chunk) {
        chunk.set_state(ChunkState::Quarantined);
        chunk.reset_for_reuse();
    }

    #[test]
    fn fresh_chunks_are_active_and_counted() {
        let alloc = ChunkAllocator::new(&config(4));
        let c = alloc.acquire().unwrap();
        assert_eq!(c.state(), ChunkState::Active);
        assert_eq!(c.capacity_words(), 512);
        assert_eq!(alloc.live_bytes(), 4096);
        assert_eq!(alloc.stats().fresh_chunks, 1);
    }

    #[test]
    fn pooled_chunk_is_reused_with_new_lease() {
        let alloc = ChunkAllocator::new(&config(4));
        let c = alloc.acquire().unwrap();
        let (id, lease) = (c.id(), c.lease());
        c.try_alloc(&TypeLayout::pointers(8), 1).unwrap();
        clear(&c);
        alloc.release_to_pool(c);
        assert_eq!(alloc.pooled_chunks(), 1);

        let again = alloc.acquire().unwrap();
        assert_eq!(again.id(), id);
        assert!(again.lease() > lease);
        assert_eq!(alloc.stats().reused_chunks, 1);
        assert_eq!(alloc.live_bytes(), 4096);
    }

    #[test]
    fn full_pool_spills_to_heap() {
        let alloc = ChunkAllocator::new(&config(1));
        let a = alloc.acquire().unwrap();
        let b = alloc.acquire().unwrap();
        clear(&a);
        clear(&b);
        alloc.release_to_pool(a);
        alloc.release_to_pool(b.clone());
        assert_eq!(alloc.pooled_chunks(), 1);
        assert_eq!(b.state(), ChunkState::Released);
        assert_eq!(alloc.live_bytes(), 4096);
        assert_eq!(alloc.stats().returned_chunks, 1);
    }

    #[test]
    fn oversized_rounds_up_and_is_never_pooled() {
        let alloc = ChunkAllocator::new(&config(4));
        let big = alloc.acquire_oversized(4097).unwrap();
        assert_eq!(big.kind(), ChunkKind::Oversized);
        assert_eq!(big.size_bytes(), 8192);
        clear(&big);
        alloc.release_to_pool(big);
        assert_eq!(alloc.pooled_chunks(), 0);
        assert_eq!(alloc.live_bytes(), 0);
    }

    #[test]
    fn budget_is_enforced() {
        let alloc = ChunkAllocator::new(&ArenaConfig {
            max_live_bytes: Some(8192),
            ..config(4)
        });
        let _a = alloc.acquire().unwrap();
        let _b = alloc.acquire().unwrap();
        let err = alloc.acquire().unwrap_err();
        assert_eq!(err, OutOfMemory::over_budget(4096, 8192));
        assert!(alloc.acquire_oversized(10_000).is_err());
        assert_eq!(alloc.live_bytes(), 8192);
    }
}
