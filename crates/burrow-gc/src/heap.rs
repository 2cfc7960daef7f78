//! The user-facing [`Heap`] and its shutdown sequence.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use burrow_core::{Addr, Collector, CycleId, Record, Word, WORD_BYTES};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, warn};

use crate::collector::{request_shutdown, spawn_collector, GcShared};
use crate::config::GcConfig;
use crate::error::HeapError;
use crate::finalizer::FinalizerQueue;
use crate::object::Object;
use crate::root::Root;

/// A garbage-collected heap with its own collector and finalizer threads.
///
/// Dropping the heap stops both threads after the work already queued.
/// Finalizers still pending at that point run before the drop returns.
pub struct Heap {
    shared: Arc<GcShared>,
    collector_thread: Option<JoinHandle<()>>,
    finalizer_thread: Option<JoinHandle<()>>,
}

// Compile-time assertion: Heap must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Heap>();
};

impl Heap {
    /// Validate `config` and start the collector (`burrow-gc`) and
    /// finalizer (`burrow-finalizer`) threads.
    pub fn new(config: GcConfig) -> Result<Self, HeapError> {
        config.validate()?;
        let (requests_tx, requests_rx) = crossbeam_channel::unbounded();
        let (queue, worker) = FinalizerQueue::new();
        let queue = Arc::new(queue);
        let shared = Arc::new(GcShared::new(config, requests_tx, Arc::clone(&queue)));

        let finalizer_thread = worker.spawn(Arc::clone(&queue))?;
        let collector_thread = match spawn_collector(Arc::clone(&shared), requests_rx) {
            Ok(handle) => handle,
            Err(e) => {
                queue.stop();
                let _ = finalizer_thread.join();
                return Err(e.into());
            }
        };
        debug!("heap started");
        Ok(Self {
            shared,
            collector_thread: Some(collector_thread),
            finalizer_thread: Some(finalizer_thread),
        })
    }

    /// Allocate `value` and return a root for it.
    ///
    /// Zero-sized values allocate nothing; their root's address is
    /// [`Addr::zero_base`].
    pub fn alloc<T: Record>(&self, value: T) -> Result<Root<T>, HeapError> {
        let layout = T::layout();
        if layout.is_zero_sized() {
            return Ok(Root::zero_sized(Arc::clone(&self.shared)));
        }
        let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
        value.store(&mut buf);
        // Publication must not straddle the start of marking: a black object
        // is never traced, so its pointers are shaded here instead.
        let object = {
            let mut shade = self.shared.write_barrier();
            for p in layout.pointer_words() {
                if buf[p] != 0 {
                    shade.visit(Addr(buf[p]));
                }
            }
            self.shared
                .alloc_object(layout, |o| o.words().write_from(0, &buf))?
        };
        Ok(Root::adopt(Arc::clone(&self.shared), object, 0))
    }

    /// Read a `T` at `addr`, which may point into the middle of an object.
    pub fn get<T: Record>(&self, addr: Addr) -> Result<T, HeapError> {
        if T::WORDS == 0 {
            return Ok(T::load(&[]));
        }
        let (object, offset) = self.locate::<T>(addr)?;
        let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
        object.words().read_into(offset, &mut buf);
        Ok(T::load(&buf))
    }

    /// Root the object containing `addr`, viewing the value at `addr` as a
    /// `T`.
    pub fn root<T: Record>(&self, addr: Addr) -> Result<Root<T>, HeapError> {
        if T::WORDS == 0 {
            return Ok(Root::zero_sized(Arc::clone(&self.shared)));
        }
        let (object, offset) = self.locate::<T>(addr)?;
        {
            let mut shade = self.shared.write_barrier();
            shade.visit(object.base());
            self.shared.add_root(object.base());
        }
        Ok(Root::adopt(Arc::clone(&self.shared), object, offset))
    }

    /// Run `finalizer` once the object behind `root` is found unreachable.
    ///
    /// The object, and everything it references, survives the cycle that
    /// queues the finalizer and is freed by a later one. Setting a new
    /// finalizer replaces the old one.
    pub fn set_finalizer<T>(
        &self,
        root: &Root<T>,
        finalizer: impl FnOnce(Addr) + Send + 'static,
    ) -> Result<(), HeapError> {
        let object = root.object().ok_or(HeapError::ZeroSized)?;
        object.set_finalizer(Box::new(finalizer));
        Ok(())
    }

    /// Whether `addr` points into a live object.
    pub fn contains(&self, addr: Addr) -> bool {
        self.shared.resolve(addr).is_some()
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.shared.object_count()
    }

    /// Bytes held by live objects.
    pub fn live_bytes(&self) -> usize {
        self.shared.live_bytes()
    }

    /// Objects currently rooted.
    pub fn rooted_objects(&self) -> usize {
        self.shared.root_count()
    }

    /// Cycles completed so far.
    pub fn completed_cycles(&self) -> CycleId {
        self.shared.completed_cycles()
    }

    /// Run a full cycle and wait for it.
    pub fn collect(&self) -> CycleId {
        self.shared.collect()
    }

    /// Ask for a cycle without waiting.
    pub fn request_cycle(&self) {
        self.shared.request_cycle();
    }

    /// This heap as the collector interface the arena runtime consumes.
    pub fn collector(&self) -> Arc<dyn Collector> {
        self.shared.clone()
    }

    /// Finalizers queued or running.
    pub fn pending_finalizers(&self) -> usize {
        self.shared.finalizers.pending()
    }

    /// Wait until the finalizer queue is empty. Returns `false` if
    /// `timeout` passed first.
    pub fn block_until_empty_finalizer_queue(&self, timeout: Duration) -> bool {
        self.shared.finalizers.block_until_empty(timeout)
    }

    fn locate<T: Record>(&self, addr: Addr) -> Result<(Arc<Object>, usize), HeapError> {
        let (object, bytes) = self
            .shared
            .resolve(addr)
            .ok_or(HeapError::DanglingAddress(addr))?;
        if bytes % WORD_BYTES != 0 {
            return Err(HeapError::DanglingAddress(addr));
        }
        let offset = bytes / WORD_BYTES;
        let found = object.layout().words() - offset;
        if T::WORDS > found {
            return Err(HeapError::LayoutMismatch {
                addr,
                expected: T::WORDS,
                found,
            });
        }
        Ok((object, offset))
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        request_shutdown(&self.shared);
        if let Some(handle) = self.collector_thread.take() {
            if handle.join().is_err() {
                warn!("collector thread panicked");
            }
        }
        self.shared.finalizers.stop();
        if let Some(handle) = self.finalizer_thread.take() {
            if handle.join().is_err() {
                warn!("finalizer thread panicked");
            }
        }
        debug!("heap shut down");
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("objects", &self.object_count())
            .field("live_bytes", &self.live_bytes())
            .field("completed_cycles", &self.completed_cycles())
            .finish_non_exhaustive()
    }
}
