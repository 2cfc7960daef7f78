//! The caller-facing arena.

use std::any::Any;
use std::sync::{Arc, Weak};

use burrow_core::{ArenaId, Collector, OutOfMemory, Record, TypeLayout, WORD_BYTES};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::chunk::Chunk;
use crate::error::ArenaError;
use crate::handle::{ArenaRef, ArenaSlice, Placement};
use crate::runtime::ArenaRuntime;

/// How an arena's chunks were released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Release {
    /// [`Arena::free`].
    Explicit,
    /// The drop finalizer, after the arena became unreachable.
    Finalized,
}

/// Mutable arena state. Shared with the drop finalizer, which must be able
/// to release the chunks after the [`Arena`] itself is gone.
#[derive(Debug)]
pub(crate) struct ArenaState {
    id: ArenaId,
    inner: Mutex<ArenaInner>,
}

#[derive(Debug, Default)]
struct ArenaInner {
    /// Every chunk handed to this arena, in acquisition order.
    chunks: Vec<Arc<Chunk>>,
    /// Index into `chunks` of the regular chunk being bump-allocated.
    current: Option<usize>,
    freed: bool,
}

impl ArenaState {
    fn release(&self, runtime: &ArenaRuntime, how: Release) -> Result<(), ArenaError> {
        let mut inner = self.inner.lock();
        if inner.freed {
            return match how {
                Release::Explicit => {
                    error!(arena = %self.id, "arena freed twice");
                    Err(ArenaError::DoubleFree { arena: self.id })
                }
                Release::Finalized => {
                    trace!(arena = %self.id, "finalizer found arena already freed");
                    Ok(())
                }
            };
        }
        inner.freed = true;
        inner.current = None;
        let chunks = std::mem::take(&mut inner.chunks);
        debug!(arena = %self.id, chunks = chunks.len(), ?how, "arena released");
        runtime.release_chunks(chunks);
        Ok(())
    }
}

/// Owned by the arena; its death is what the collector watches for.
#[derive(Debug)]
struct LivenessToken {
    _arena: ArenaId,
}

/// A bump allocator whose memory is released all at once.
///
/// Values are allocated with [`alloc`](Self::alloc) and
/// [`alloc_slice`](Self::alloc_slice) and accessed through the returned
/// handles. Pointer words stored in arena memory keep their targets alive
/// until the arena is released.
///
/// Release happens either explicitly through [`free`](Self::free), or when
/// the arena is dropped and the collector later finalizes it. Either way
/// the chunks go through quarantine before anything else can reuse them.
#[derive(Debug)]
pub struct Arena {
    runtime: Arc<ArenaRuntime>,
    state: Arc<ArenaState>,
    _token: Arc<LivenessToken>,
}

impl Arena {
    pub(crate) fn new(runtime: Arc<ArenaRuntime>) -> Self {
        let id = ArenaId::next();
        let state = Arc::new(ArenaState {
            id,
            inner: Mutex::new(ArenaInner::default()),
        });
        let token = Arc::new(LivenessToken { _arena: id });
        let weak_token = Arc::downgrade(&token);
        let watched: Weak<dyn Any + Send + Sync> = weak_token;

        let finalizer_runtime = Arc::downgrade(&runtime);
        let finalizer_state = Arc::clone(&state);
        runtime.collector().register_drop_finalizer(
            watched,
            Box::new(move || {
                if let Some(runtime) = finalizer_runtime.upgrade() {
                    // Cannot fail: a second release is silent here.
                    let _ = finalizer_state.release(&runtime, Release::Finalized);
                }
            }),
        );
        debug!(arena = %id, "arena created");

        Self {
            runtime,
            state,
            _token: token,
        }
    }

    /// This arena's id.
    pub fn id(&self) -> ArenaId {
        self.state.id
    }

    /// Allocate one zeroed `T`.
    ///
    /// Zero-sized types never touch a chunk; their handle's address is
    /// [`Addr::zero_base`](burrow_core::Addr::zero_base).
    pub fn alloc<T: Record>(&self) -> Result<ArenaRef<T>, ArenaError> {
        let layout = T::layout();
        if layout.is_zero_sized() {
            self.check_live()?;
            return Ok(ArenaRef::zero_sized());
        }
        let placement = self.place(&layout, 1)?;
        Ok(ArenaRef::new(placement, self.id(), self.collector()))
    }

    /// Allocate one `T` initialised to `value`.
    pub fn alloc_value<T: Record>(&self, value: T) -> Result<ArenaRef<T>, ArenaError> {
        let r = self.alloc::<T>()?;
        r.set(value)?;
        Ok(r)
    }

    /// Allocate `len` contiguous zeroed `T`s.
    ///
    /// `len == 0` allocates nothing and yields an empty slice at
    /// [`Addr::NULL`](burrow_core::Addr::NULL).
    pub fn alloc_slice<T: Record>(&self, len: usize) -> Result<ArenaSlice<T>, ArenaError> {
        self.check_live()?;
        if len == 0 {
            return Ok(ArenaSlice::empty());
        }
        let layout = T::layout();
        if layout.is_zero_sized() {
            return Ok(ArenaSlice::zero_sized(len));
        }
        let placement = self.place(&layout, len)?;
        Ok(ArenaSlice::new(placement, len, self.id(), self.collector()))
    }

    /// Release every chunk into quarantine and end the arena.
    ///
    /// Later allocations fail with [`ArenaError::Freed`], as do accesses
    /// through existing handles. Freeing twice is
    /// [`ArenaError::DoubleFree`].
    pub fn free(&self) -> Result<(), ArenaError> {
        self.state.release(&self.runtime, Release::Explicit)
    }

    /// Whether the arena has been freed.
    pub fn is_freed(&self) -> bool {
        self.state.inner.lock().freed
    }

    /// Chunks (regular and oversized) currently owned.
    pub fn chunk_count(&self) -> usize {
        self.state.inner.lock().chunks.len()
    }

    /// Bytes handed out across all owned chunks. Unused chunk tails are
    /// not counted.
    pub fn used_bytes(&self) -> usize {
        let inner = self.state.inner.lock();
        inner.chunks.iter().map(|c| c.used_words() * WORD_BYTES).sum()
    }

    fn collector(&self) -> Arc<dyn Collector> {
        Arc::clone(self.runtime.collector())
    }

    fn check_live(&self) -> Result<(), ArenaError> {
        if self.state.inner.lock().freed {
            return Err(ArenaError::Freed { arena: self.id() });
        }
        Ok(())
    }

    /// Find room for `count` values of `layout`, acquiring a chunk if the
    /// current one is exhausted.
    fn place(&self, layout: &TypeLayout, count: usize) -> Result<Placement, ArenaError> {
        let overflow = || ArenaError::LengthOverflow {
            len: count,
            element_words: layout.words(),
        };
        let words = layout.words().checked_mul(count).ok_or_else(overflow)?;
        let bytes = words.checked_mul(WORD_BYTES).ok_or_else(overflow)?;

        let mut inner = self.state.inner.lock();
        if inner.freed {
            return Err(ArenaError::Freed { arena: self.id() });
        }

        if words > self.runtime.config().chunk_words() {
            let chunk = self.runtime.acquire_oversized(bytes)?;
            let placement = fill(&chunk, layout, count, bytes)?;
            trace!(arena = %self.id(), chunk = %chunk.id(), bytes, "oversized allocation");
            inner.chunks.push(chunk);
            return Ok(placement);
        }

        if let Some(i) = inner.current {
            let chunk = &inner.chunks[i];
            if let Some(offset) = chunk.try_alloc(layout, count) {
                return Ok(Placement {
                    chunk: Arc::clone(chunk),
                    offset,
                    lease: chunk.lease(),
                });
            }
        }

        let chunk = self.runtime.acquire_chunk()?;
        let placement = fill(&chunk, layout, count, bytes)?;
        trace!(arena = %self.id(), chunk = %chunk.id(), "arena moved to new chunk");
        inner.chunks.push(chunk);
        inner.current = Some(inner.chunks.len() - 1);
        Ok(placement)
    }
}

/// First allocation in a chunk that was sized to fit it.
fn fill(
    chunk: &Arc<Chunk>,
    layout: &TypeLayout,
    count: usize,
    bytes: usize,
) -> Result<Placement, ArenaError> {
    let offset = chunk
        .try_alloc(layout, count)
        .ok_or_else(|| OutOfMemory::system(bytes))?;
    Ok(Placement {
        chunk: Arc::clone(chunk),
        offset,
        lease: chunk.lease(),
    })
}
