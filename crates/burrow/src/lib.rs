//! Burrow: user-managed arenas over a tracing garbage collector.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Burrow sub-crates and bundles a reference [`Heap`](gc::Heap) with an
//! [`ArenaRuntime`](arena::ArenaRuntime) in one [`Runtime`].
//!
//! # Quick start
//!
//! ```rust
//! use burrow::prelude::*;
//!
//! let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
//!
//! // A heap object, referenced only from arena memory.
//! let target = runtime.heap().alloc(7u64).unwrap();
//! let arena = runtime.new_arena();
//! let slot = arena.alloc_value(target.addr()).unwrap();
//! let addr = target.addr();
//! drop(target);
//!
//! runtime.collect();
//! assert_eq!(runtime.heap().get::<u64>(addr).unwrap(), 7);
//! assert_eq!(slot.get().unwrap(), addr);
//!
//! arena.free().unwrap();
//! runtime.collect();
//! assert_eq!(runtime.waiting_arena_chunks(), 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `burrow-core` | Addresses, layouts, `Record`, collector traits |
//! | [`arena`] | `burrow-arena` | Arenas, chunks, bitmaps, pool, quarantine |
//! | [`gc`] | `burrow-gc` | Reference mark-sweep heap |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Arenas, chunks and the quarantine (`burrow-arena`).
pub use burrow_arena as arena;

/// Core types, traits and IDs (`burrow-core`).
///
/// Implement [`types::Record`] for a value type to store it in arena or
/// heap memory.
pub use burrow_core as types;

/// Reference tracing collector (`burrow-gc`).
pub use burrow_gc as gc;

use burrow_arena::{Arena, ArenaConfig, ArenaError, ArenaRuntime, RuntimeStats};
use burrow_core::CycleId;
use burrow_gc::{GcConfig, Heap, HeapError};

/// Common imports for typical Burrow usage.
pub mod prelude {
    pub use crate::{Runtime, RuntimeConfig, RuntimeError};

    pub use burrow_arena::{Arena, ArenaConfig, ArenaError, ArenaRef, ArenaSlice};
    pub use burrow_core::{Addr, Bytes, Record, TypeLayout, Word};
    pub use burrow_gc::{GcConfig, Heap, HeapError, Root};
}

/// Configuration for a [`Runtime`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Chunk, pool and quarantine settings.
    pub arena: ArenaConfig,
    /// Heap budget and cycle trigger.
    pub gc: GcConfig,
}

/// Errors from [`Runtime`] operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An arena operation failed.
    #[error(transparent)]
    Arena(#[from] ArenaError),
    /// A heap operation failed.
    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// A reference heap plus the arena runtime registered with it.
pub struct Runtime {
    arenas: Arc<ArenaRuntime>,
    heap: Heap,
}

impl Runtime {
    /// Start the heap's threads and attach an arena runtime to it.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let heap = Heap::new(config.gc)?;
        let arenas = ArenaRuntime::new(config.arena, heap.collector())?;
        debug!("runtime started");
        Ok(Self { arenas, heap })
    }

    /// A new, empty arena.
    pub fn new_arena(&self) -> Arena {
        self.arenas.new_arena()
    }

    /// The reference heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The arena runtime.
    pub fn arenas(&self) -> &Arc<ArenaRuntime> {
        &self.arenas
    }

    /// Run a full collector cycle and wait for it.
    pub fn collect(&self) -> CycleId {
        self.heap.collect()
    }

    /// Arena chunks still waiting in quarantine.
    pub fn waiting_arena_chunks(&self) -> usize {
        self.arenas.waiting_chunks()
    }

    /// Arena runtime counters.
    pub fn arena_stats(&self) -> RuntimeStats {
        self.arenas.stats()
    }

    /// Wait for queued finalizers, including arena drop finalizers.
    /// Returns `false` if `timeout` passed first.
    pub fn block_until_empty_finalizer_queue(&self, timeout: Duration) -> bool {
        self.heap.block_until_empty_finalizer_queue(timeout)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("arenas", &self.arenas)
            .field("heap", &self.heap)
            .finish()
    }
}
