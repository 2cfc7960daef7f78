//! The arena runtime: the shared state behind every arena, and the glue
//! between the arenas and the collector.
//!
//! ```text
//! ArenaRuntime
//! ├── ChunkAllocator (bounded reuse pool + heap fallback)
//! ├── active: ChunkId → Chunk   (scanned as roots every cycle)
//! ├── Quarantine                (released chunks, stamped with a cycle)
//! └── Arc<dyn Collector>
//!     ├── RootScanner   → scan every active chunk's pointer words
//!     └── CycleObserver → drain cleared quarantine, clear bitmaps, pool
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use burrow_core::{
    ChunkId, Collector, CycleId, CycleObserver, OutOfMemory, RootScanner, Tracer,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::chunk::{Chunk, ChunkState};
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::pool::{AllocatorStats, ChunkAllocator};
use crate::quarantine::Quarantine;

/// Point-in-time counters for a runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Chunks owned by live arenas.
    pub active_chunks: usize,
    /// Chunks waiting in quarantine.
    pub waiting_chunks: usize,
    /// Allocator counters.
    pub allocator: AllocatorStats,
}

/// Shared state for a family of arenas using one collector.
pub struct ArenaRuntime {
    config: ArenaConfig,
    allocator: ChunkAllocator,
    quarantine: Quarantine,
    active: Mutex<IndexMap<ChunkId, Arc<Chunk>>>,
    collector: Arc<dyn Collector>,
}

impl ArenaRuntime {
    /// Validate `config` and register the runtime with `collector` as a root
    /// scanner and cycle observer.
    pub fn new(config: ArenaConfig, collector: Arc<dyn Collector>) -> Result<Arc<Self>, ArenaError> {
        config.validate()?;
        let runtime = Arc::new(Self {
            allocator: ChunkAllocator::new(&config),
            quarantine: Quarantine::new(config.quarantine_cycles),
            active: Mutex::new(IndexMap::new()),
            collector,
            config,
        });
        let weak = Arc::downgrade(&runtime);
        let scanner: Weak<dyn RootScanner> = weak.clone();
        let observer: Weak<dyn CycleObserver> = weak;
        runtime.collector.register_root_scanner(scanner);
        runtime.collector.register_cycle_observer(observer);
        debug!(chunk_bytes = runtime.config.chunk_bytes, "arena runtime started");
        Ok(runtime)
    }

    /// A new, empty arena.
    pub fn new_arena(self: &Arc<Self>) -> Arena {
        Arena::new(Arc::clone(self))
    }

    /// The runtime's configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// The collector this runtime is registered with.
    pub fn collector(&self) -> &Arc<dyn Collector> {
        &self.collector
    }

    /// Chunks released but not yet cleared for reuse.
    pub fn waiting_chunks(&self) -> usize {
        self.quarantine.waiting()
    }

    /// Chunks parked in the reuse pool.
    pub fn pooled_chunks(&self) -> usize {
        self.allocator.pooled_chunks()
    }

    /// Chunks owned by arenas that have not been released.
    pub fn active_chunks(&self) -> usize {
        self.active.lock().len()
    }

    /// Snapshot of every counter.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            active_chunks: self.active_chunks(),
            waiting_chunks: self.waiting_chunks(),
            allocator: self.allocator.stats(),
        }
    }

    pub(crate) fn acquire_chunk(&self) -> Result<Arc<Chunk>, OutOfMemory> {
        let chunk = self.allocator.acquire()?;
        self.activate(&chunk);
        Ok(chunk)
    }

    pub(crate) fn acquire_oversized(&self, bytes: usize) -> Result<Arc<Chunk>, OutOfMemory> {
        let chunk = self.allocator.acquire_oversized(bytes)?;
        self.activate(&chunk);
        Ok(chunk)
    }

    /// Registered before the first allocation lands, so the scan set
    /// always covers every reachable arena word.
    fn activate(&self, chunk: &Arc<Chunk>) {
        self.active.lock().insert(chunk.id(), Arc::clone(chunk));
    }

    /// Move a released arena's chunks into quarantine.
    ///
    /// The chunks leave the scan set first; only then is the cycle stamp
    /// read, so any cycle that could still be scanning them completes
    /// before the stamp is cleared.
    pub(crate) fn release_chunks(&self, chunks: Vec<Arc<Chunk>>) {
        if chunks.is_empty() {
            return;
        }
        {
            let mut active = self.active.lock();
            for chunk in &chunks {
                active.shift_remove(&chunk.id());
            }
        }
        let released_at = self.collector.completed_cycles();
        for chunk in &chunks {
            chunk.set_state(ChunkState::Quarantined);
        }
        trace!(chunks = chunks.len(), %released_at, "chunks quarantined");
        self.quarantine.push_all(chunks, released_at);
        self.collector.request_cycle();
    }

    fn reclaim(&self, completed: CycleId) -> usize {
        let cleared = self.quarantine.drain_cleared(completed);
        let n = cleared.len();
        for chunk in cleared {
            chunk.reset_for_reuse();
            self.allocator.release_to_pool(chunk);
        }
        n
    }
}

impl RootScanner for ArenaRuntime {
    fn scan_roots(&self, tracer: &mut dyn Tracer) {
        let chunks: Vec<Arc<Chunk>> = self.active.lock().values().cloned().collect();
        for chunk in &chunks {
            trace!(chunk = %chunk.id(), used = chunk.used_words(), "scanning chunk");
            chunk.scan(tracer);
        }
    }
}

impl CycleObserver for ArenaRuntime {
    fn cycle_completed(&self, cycle: CycleId) {
        let reclaimed = self.reclaim(cycle);
        if reclaimed > 0 {
            debug!(
                %cycle,
                reclaimed,
                waiting = self.quarantine.waiting(),
                pooled = self.allocator.pooled_chunks(),
                "quarantine drained"
            );
        }
    }
}

impl fmt::Debug for ArenaRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaRuntime")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
