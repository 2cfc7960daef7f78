//! Shared collector state, the mark/sweep cycle and the collector thread.
//!
//! # Cycle
//!
//! 1. Bump the mark epoch, then, with no store in flight, enter the cycle
//!    (new objects are allocated black) and turn the write barrier on.
//! 2. Mark from the counted roots and every registered [`RootScanner`],
//!    tracing pointer words transitively.
//! 3. Drain the shaded buffer. Once it is empty with no store in flight,
//!    turn the barrier off.
//!
//! The barrier shades both the pointer a store overwrites and the pointer
//! it writes. Everything reachable when marking starts therefore survives
//! the cycle even if it is unlinked from a scanned location before the
//! scan reaches it.
//! 4. Resurrect unmarked objects that carry a finalizer, queue their
//!    finalizers, and trace what they reference.
//! 5. Sweep every object still unmarked.
//! 6. Advance the completed-cycle counter, queue drop finalizers whose
//!    tokens died, and notify every [`CycleObserver`].

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use burrow_core::{
    Addr, Collector, CycleId, CycleObserver, DropFinalizer, OutOfMemory, RootScanner, Tracer,
    TypeLayout,
};
use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, trace};

use crate::config::GcConfig;
use crate::error::HeapError;
use crate::finalizer::FinalizerQueue;
use crate::object::Object;

/// Messages to the collector thread.
pub(crate) enum Request {
    /// Run one cycle; reply with the new completed count if asked.
    Cycle { reply: Option<Sender<CycleId>> },
    Shutdown,
}

/// A held write barrier. Shades only while marking.
struct Shade<'a> {
    marking: RwLockReadGuard<'a, bool>,
    shaded: &'a Mutex<Vec<Addr>>,
}

impl Tracer for Shade<'_> {
    fn visit(&mut self, target: Addr) {
        if *self.marking && !target.is_null() {
            self.shaded.lock().push(target);
        }
    }
}

type Watched = (Weak<dyn Any + Send + Sync>, DropFinalizer);

/// State shared by the [`Heap`](crate::Heap), every [`Root`](crate::Root),
/// the collector thread and anyone holding the heap as a `dyn Collector`.
pub(crate) struct GcShared {
    config: GcConfig,
    /// Live objects keyed by base address.
    objects: RwLock<BTreeMap<usize, Arc<Object>>>,
    live_bytes: AtomicUsize,
    since_cycle: AtomicUsize,
    /// Root counts keyed by object base address.
    roots: Mutex<IndexMap<usize, usize>>,
    scanners: Mutex<Vec<Weak<dyn RootScanner>>>,
    observers: Mutex<Vec<Weak<dyn CycleObserver>>>,
    watched: Mutex<Vec<Watched>>,
    completed: AtomicU64,
    epoch: AtomicU64,
    /// Set from the start of marking until the sweep is done.
    in_cycle: AtomicBool,
    cycle_requested: AtomicBool,
    /// Write-locked only to turn marking on or off.
    marking: RwLock<bool>,
    shaded: Mutex<Vec<Addr>>,
    requests: Sender<Request>,
    pub(crate) finalizers: Arc<FinalizerQueue>,
}

impl GcShared {
    pub(crate) fn new(
        config: GcConfig,
        requests: Sender<Request>,
        finalizers: Arc<FinalizerQueue>,
    ) -> Self {
        Self {
            config,
            objects: RwLock::new(BTreeMap::new()),
            live_bytes: AtomicUsize::new(0),
            since_cycle: AtomicUsize::new(0),
            roots: Mutex::new(IndexMap::new()),
            scanners: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            watched: Mutex::new(Vec::new()),
            completed: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            in_cycle: AtomicBool::new(false),
            cycle_requested: AtomicBool::new(false),
            marking: RwLock::new(false),
            shaded: Mutex::new(Vec::new()),
            requests,
            finalizers,
        }
    }

    // ── Objects ────────────────────────────────────────────────────

    /// Allocate a zeroed object, initialise it with `init`, root it once
    /// and publish it.
    pub(crate) fn alloc_object(
        &self,
        layout: TypeLayout,
        init: impl FnOnce(&Object),
    ) -> Result<Arc<Object>, HeapError> {
        let bytes = layout.size_bytes();
        self.reserve(bytes)?;
        let object = match Object::new(layout, 0) {
            Ok(object) => Arc::new(object),
            Err(e) => {
                self.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
                return Err(e.into());
            }
        };
        init(&object);
        self.add_root(object.base());
        {
            let mut objects = self.objects.write();
            if self.in_cycle.load(Ordering::Acquire) {
                object.try_mark(self.epoch.load(Ordering::Acquire));
            }
            objects.insert(object.base().0, Arc::clone(&object));
        }

        if let Some(trigger) = self.config.trigger_bytes {
            let since = self.since_cycle.fetch_add(bytes, Ordering::AcqRel) + bytes;
            if since >= trigger {
                self.request_cycle();
            }
        }
        Ok(object)
    }

    fn reserve(&self, bytes: usize) -> Result<(), OutOfMemory> {
        match self.config.max_heap_bytes {
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

    /// The object containing `addr` and the byte offset of `addr` in it.
    pub(crate) fn resolve(&self, addr: Addr) -> Option<(Arc<Object>, usize)> {
        if addr.is_null() || addr == Addr::zero_base() {
            return None;
        }
        let objects = self.objects.read();
        let (&base, object) = objects.range(..=addr.0).next_back()?;
        let offset = addr.0 - base;
        (offset < object.size_bytes()).then(|| (Arc::clone(object), offset))
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub(crate) fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }

    // ── Roots ──────────────────────────────────────────────────────

    pub(crate) fn add_root(&self, base: Addr) {
        *self.roots.lock().entry(base.0).or_insert(0) += 1;
    }

    pub(crate) fn remove_root(&self, base: Addr) {
        let mut roots = self.roots.lock();
        if let Some(count) = roots.get_mut(&base.0) {
            *count -= 1;
            if *count == 0 {
                roots.swap_remove(&base.0);
            }
        }
    }

    pub(crate) fn root_count(&self) -> usize {
        self.roots.lock().len()
    }

    // ── Cycle ──────────────────────────────────────────────────────

    fn run_cycle(&self) -> CycleId {
        let started = Instant::now();
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.since_cycle.store(0, Ordering::Release);
        {
            let mut marking = self.marking.write();
            self.shaded.lock().clear();
            self.in_cycle.store(true, Ordering::Release);
            *marking = true;
        }

        let mut marker = Marker::new(self, epoch);
        let roots: Vec<usize> = self.roots.lock().keys().copied().collect();
        for base in roots {
            marker.visit(Addr(base));
        }
        for scanner in live(&self.scanners) {
            scanner.scan_roots(&mut marker);
        }
        marker.drain();

        loop {
            let shaded = std::mem::take(&mut *self.shaded.lock());
            if shaded.is_empty() {
                let mut marking = self.marking.write();
                if self.shaded.lock().is_empty() {
                    *marking = false;
                    break;
                }
                continue;
            }
            for target in shaded {
                marker.visit(target);
            }
            marker.drain();
        }

        let doomed: Vec<Arc<Object>> = self
            .objects
            .read()
            .values()
            .filter(|o| !o.is_marked(epoch) && o.has_finalizer())
            .cloned()
            .collect();
        let mut finalizing = 0;
        for object in doomed {
            if let Some(finalizer) = object.take_finalizer() {
                let addr = object.base();
                self.finalizers.push(Box::new(move || finalizer(addr)));
                finalizing += 1;
            }
            marker.visit(object.base());
        }
        marker.drain();

        let (freed, freed_bytes) = {
            let mut objects = self.objects.write();
            let before = objects.len();
            let mut bytes = 0;
            objects.retain(|_, o| {
                let keep = o.is_marked(epoch);
                if !keep {
                    bytes += o.size_bytes();
                }
                keep
            });
            self.in_cycle.store(false, Ordering::Release);
            (before - objects.len(), bytes)
        };
        self.live_bytes.fetch_sub(freed_bytes, Ordering::AcqRel);

        let cycle = CycleId(self.completed.fetch_add(1, Ordering::AcqRel) + 1);

        let dead: Vec<DropFinalizer> = {
            let mut watched = self.watched.lock();
            let (dead, alive): (Vec<_>, Vec<_>) = watched
                .drain(..)
                .partition(|(token, _)| token.strong_count() == 0);
            *watched = alive;
            dead.into_iter().map(|(_, f)| f).collect()
        };
        let dropped = dead.len();
        for finalizer in dead {
            self.finalizers.push(finalizer);
        }

        for observer in live(&self.observers) {
            observer.cycle_completed(cycle);
        }

        debug!(
            %cycle,
            marked = marker.marked,
            freed,
            freed_bytes,
            finalizing,
            dropped,
            elapsed_us = started.elapsed().as_micros() as u64,
            "cycle complete"
        );
        cycle
    }
}

/// Upgrade every live registration, forgetting dead ones.
fn live<T: ?Sized>(list: &Mutex<Vec<Weak<T>>>) -> Vec<Arc<T>> {
    let mut list = list.lock();
    list.retain(|w| w.strong_count() > 0);
    list.iter().filter_map(Weak::upgrade).collect()
}

/// Gray-stack marker for one cycle.
struct Marker<'a> {
    shared: &'a GcShared,
    epoch: u64,
    gray: Vec<Arc<Object>>,
    marked: usize,
}

impl<'a> Marker<'a> {
    fn new(shared: &'a GcShared, epoch: u64) -> Self {
        Self {
            shared,
            epoch,
            gray: Vec::new(),
            marked: 0,
        }
    }

    fn drain(&mut self) {
        while let Some(object) = self.gray.pop() {
            object.for_each_pointer(|target| self.visit(target));
        }
    }
}

impl Tracer for Marker<'_> {
    fn visit(&mut self, target: Addr) {
        if let Some((object, _)) = self.shared.resolve(target) {
            if object.try_mark(self.epoch) {
                self.marked += 1;
                self.gray.push(object);
            }
        }
    }
}

impl Collector for GcShared {
    fn completed_cycles(&self) -> CycleId {
        CycleId(self.completed.load(Ordering::Acquire))
    }

    fn request_cycle(&self) {
        if !self.cycle_requested.swap(true, Ordering::AcqRel)
            && self.requests.send(Request::Cycle { reply: None }).is_err()
        {
            self.cycle_requested.store(false, Ordering::Release);
        }
    }

    /// Must not be called from the collector thread itself (a scanner or
    /// observer callback).
    fn collect(&self) -> CycleId {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self.requests.send(Request::Cycle { reply: Some(tx) }).is_err() {
            return self.completed_cycles();
        }
        rx.recv().unwrap_or_else(|_| self.completed_cycles())
    }

    fn write_barrier(&self) -> Box<dyn Tracer + '_> {
        Box::new(Shade {
            marking: self.marking.read(),
            shaded: &self.shaded,
        })
    }

    fn register_root_scanner(&self, scanner: Weak<dyn RootScanner>) {
        self.scanners.lock().push(scanner);
    }

    fn register_cycle_observer(&self, observer: Weak<dyn CycleObserver>) {
        self.observers.lock().push(observer);
    }

    fn register_drop_finalizer(&self, token: Weak<dyn Any + Send + Sync>, finalizer: DropFinalizer) {
        self.watched.lock().push((token, finalizer));
    }
}

/// Start the collector thread.
pub(crate) fn spawn_collector(
    shared: Arc<GcShared>,
    requests: Receiver<Request>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("burrow-gc".into())
        .spawn(move || {
            while let Ok(request) = requests.recv() {
                match request {
                    Request::Cycle { reply } => {
                        if reply.is_none() {
                            shared.cycle_requested.store(false, Ordering::Release);
                        }
                        let cycle = shared.run_cycle();
                        if let Some(reply) = reply {
                            // Caller may have given up waiting.
                            let _ = reply.send(cycle);
                        }
                    }
                    Request::Shutdown => break,
                }
            }
            trace!("collector thread exiting");
        })
}

/// Ask the collector thread to exit after the requests already queued.
pub(crate) fn request_shutdown(shared: &GcShared) {
    let _ = shared.requests.send(Request::Shutdown);
}
