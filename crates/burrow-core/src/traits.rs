//! The collector interface.
//!
//! The arena does not know how the collector marks or sweeps. It needs
//! only what these traits provide: a way to report pointers during
//! marking ([`RootScanner`]), a notification when a cycle ends
//! ([`CycleObserver`]), the completed-cycle counter, a write barrier and
//! drop finalization for arena handles. Registrations are weak, so a
//! collector never keeps an arena runtime alive.

use std::any::Any;
use std::sync::Weak;

use crate::id::{Addr, CycleId};

/// Receives pointer values discovered while scanning.
pub trait Tracer {
    /// Treat `target` as reachable. Null and unknown addresses are ignored.
    fn visit(&mut self, target: Addr);
}

/// A source of pointers the collector must treat as roots.
///
/// Called from the collector thread during marking, concurrently with
/// mutators. Implementations must report every pointer word that was
/// published before the scan started.
pub trait RootScanner: Send + Sync {
    /// Report every pointer this scanner currently holds.
    fn scan_roots(&self, tracer: &mut dyn Tracer);
}

/// Notified after each collector cycle completes.
pub trait CycleObserver: Send + Sync {
    /// Cycle `cycle` has finished: [`Collector::completed_cycles`] now
    /// returns at least `cycle`.
    fn cycle_completed(&self, cycle: CycleId);
}

/// Deferred work run by the collector once its token is unreachable.
pub type DropFinalizer = Box<dyn FnOnce() + Send + 'static>;

/// What the arena requires from a tracing collector.
pub trait Collector: Send + Sync {
    /// Number of cycles fully completed so far.
    fn completed_cycles(&self) -> CycleId;

    /// Ask for a cycle soon. Never blocks; repeated requests may coalesce.
    fn request_cycle(&self);

    /// Run a full cycle and wait for it. Returns the new completed count.
    fn collect(&self) -> CycleId;

    /// Hold the write barrier for one store into managed memory.
    ///
    /// Marking cannot begin or end while the returned guard is alive. The
    /// caller reports through it every non-null pointer the store
    /// overwrites and every non-null pointer it writes, performs the store,
    /// then drops the guard. Guards must not be nested on one thread.
    fn write_barrier(&self) -> Box<dyn Tracer + '_>;

    /// Register a root scanner for every future cycle.
    fn register_root_scanner(&self, scanner: Weak<dyn RootScanner>);

    /// Register an observer for every future cycle end.
    fn register_cycle_observer(&self, observer: Weak<dyn CycleObserver>);

    /// Run `finalizer` on the finalizer thread after the cycle in which
    /// `token` is found dropped.
    fn register_drop_finalizer(
        &self,
        token: Weak<dyn Any + Send + Sync>,
        finalizer: DropFinalizer,
    );
}
