//! A collector that does nothing on its own.
//!
//! [`MockCollector`] records what the arena asks of it and runs a "cycle"
//! only when a test calls [`complete_cycle`](MockCollector::complete_cycle),
//! which makes quarantine timing fully deterministic.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use burrow_core::{
    Addr, Collector, CycleId, CycleObserver, DropFinalizer, RootScanner, Tracer,
};
use parking_lot::{Mutex, MutexGuard};

type Watched = (Weak<dyn Any + Send + Sync>, DropFinalizer);

/// Deterministic stand-in for a tracing collector.
#[derive(Default)]
pub struct MockCollector {
    completed: AtomicU64,
    requests: AtomicU64,
    barriers: Mutex<Vec<Addr>>,
    scanners: Mutex<Vec<Weak<dyn RootScanner>>>,
    observers: Mutex<Vec<Weak<dyn CycleObserver>>>,
    watched: Mutex<Vec<Watched>>,
}

struct Collect<'a>(&'a mut Vec<Addr>);

/// Records shaded addresses until dropped.
struct Recording<'a>(MutexGuard<'a, Vec<Addr>>);

impl Tracer for Recording<'_> {
    fn visit(&mut self, target: Addr) {
        self.0.push(target);
    }
}

impl Tracer for Collect<'_> {
    fn visit(&mut self, target: Addr) {
        self.0.push(target);
    }
}

impl MockCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Advance the cycle counter and notify every live observer.
    pub fn complete_cycle(&self) -> CycleId {
        let cycle = CycleId(self.completed.fetch_add(1, Ordering::AcqRel) + 1);
        let observers: Vec<_> = self
            .observers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for observer in observers {
            observer.cycle_completed(cycle);
        }
        cycle
    }

    /// Run every live root scanner and return what it reported, in order.
    pub fn scan(&self) -> Vec<Addr> {
        let scanners: Vec<_> = self
            .scanners
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        let mut seen = Vec::new();
        for scanner in scanners {
            scanner.scan_roots(&mut Collect(&mut seen));
        }
        seen
    }

    /// Every address shaded through the write barrier so far, overwritten
    /// pointers before the pointers that replaced them.
    pub fn barriers(&self) -> Vec<Addr> {
        self.barriers.lock().clone()
    }

    /// How many times `request_cycle` was called.
    pub fn requested_cycles(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    /// Run the drop finalizers whose tokens are gone. Returns how many ran.
    pub fn run_dead_finalizers(&self) -> usize {
        let dead: Vec<DropFinalizer> = {
            let mut watched = self.watched.lock();
            let (dead, live): (Vec<_>, Vec<_>) = watched
                .drain(..)
                .partition(|(token, _)| token.strong_count() == 0);
            *watched = live;
            dead.into_iter().map(|(_, f)| f).collect()
        };
        let n = dead.len();
        for finalizer in dead {
            finalizer();
        }
        n
    }
}

impl Collector for MockCollector {
    fn completed_cycles(&self) -> CycleId {
        CycleId(self.completed.load(Ordering::Acquire))
    }

    fn request_cycle(&self) {
        self.requests.fetch_add(1, Ordering::AcqRel);
    }

    fn collect(&self) -> CycleId {
        self.complete_cycle()
    }

    fn write_barrier(&self) -> Box<dyn Tracer + '_> {
        Box::new(Recording(self.barriers.lock()))
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
