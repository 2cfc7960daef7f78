//! Liveness through arena memory, on both release paths, and the
//! guarantee that recycled chunks never retain anything.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use burrow::arena::ArenaRuntime;
use burrow::prelude::*;
use burrow::types::{RootScanner, Tracer};
use burrow_test_utils::fixtures::{MediumPointerOdd, MediumScalarEven, SmallPointerMix};
use burrow_test_utils::{init_tracing, TEST_CHUNK_BYTES, TEST_CHUNK_WORDS};
use parking_lot::Mutex;

const WAIT: Duration = Duration::from_secs(2);

fn runtime() -> Runtime {
    init_tracing();
    Runtime::new(RuntimeConfig {
        arena: ArenaConfig::new().with_chunk_bytes(TEST_CHUNK_BYTES),
        ..RuntimeConfig::default()
    })
    .unwrap()
}

/// A heap object with a finalizer that counts its runs. The caller holds
/// the only root.
fn watched_object<T: Record>(rt: &Runtime, ran: &Arc<AtomicUsize>, value: T) -> Root<T> {
    let root = rt.heap().alloc(value).unwrap();
    let ran = Arc::clone(ran);
    rt.heap()
        .set_finalizer(&root, move |_| {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    root
}

/// Collect until `done` holds or two seconds pass.
fn collect_until(rt: &Runtime, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        rt.collect();
        assert!(rt.block_until_empty_finalizer_queue(WAIT));
        if done() {
            return true;
        }
    }
    done()
}

fn collect_twice(rt: &Runtime) {
    for _ in 0..2 {
        rt.collect();
        assert!(rt.block_until_empty_finalizer_queue(WAIT));
    }
}

/// An object referenced only from the middle of an arena chunk stays alive
/// while the chunk fills up with unrelated scalar data, then dies once the
/// arena is released by `free` or by being dropped.
fn arena_pointers_keep_objects_alive(free_explicitly: bool) {
    let rt = runtime();
    let ran = Arc::new(AtomicUsize::new(0));
    let arena = rt.new_arena();

    // Pointer-bearing but never written, so the reference lands mid-chunk.
    for _ in 0..3 {
        arena.alloc::<MediumPointerOdd>().unwrap();
    }
    let mix = arena.alloc::<SmallPointerMix>().unwrap();
    let object = watched_object(&rt, &ran, 77u64);
    let addr = object.addr();
    mix.update(|m| m.c = addr).unwrap();
    drop(object);

    collect_twice(&rt);
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    for _ in 0..TEST_CHUNK_WORDS / MediumScalarEven::WORDS {
        arena.alloc::<MediumScalarEven>().unwrap();
    }
    assert!(arena.chunk_count() > 1);

    collect_twice(&rt);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(rt.heap().get::<u64>(mix.get().unwrap().c).unwrap(), 77);

    let id = arena.id();
    if free_explicitly {
        arena.free().unwrap();
    } else {
        drop(arena);
    }
    assert!(collect_until(&rt, || ran.load(Ordering::SeqCst) == 1));
    assert!(collect_until(&rt, || !rt.heap().contains(addr)));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(mix.get(), Err(ArenaError::Freed { arena: id }));
}

#[test]
fn arena_pointers_keep_objects_alive_until_free() {
    arena_pointers_keep_objects_alive(true);
}

#[test]
fn arena_pointers_keep_objects_alive_until_drop() {
    arena_pointers_keep_objects_alive(false);
}

#[test]
fn dropped_arena_is_finalized_and_releases_its_targets() {
    let rt = runtime();
    let ran = Arc::new(AtomicUsize::new(0));
    let object = watched_object(&rt, &ran, 77u64);
    let addr = object.addr();

    let arena = rt.new_arena();
    let slice = arena.alloc_slice::<Addr>(16).unwrap();
    slice.set(15, addr).unwrap();
    drop(object);

    rt.collect();
    assert!(rt.block_until_empty_finalizer_queue(WAIT));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(rt.arenas().active_chunks(), 1);

    drop(slice);
    drop(arena);
    assert!(collect_until(&rt, || ran.load(Ordering::SeqCst) == 1));
    assert!(collect_until(&rt, || rt.waiting_arena_chunks() == 0
        && rt.arenas().active_chunks() == 0));
    assert_eq!(rt.arenas().pooled_chunks(), 1);
}

#[test]
fn handles_keep_nothing_alive_after_drop_finalization() {
    let rt = runtime();
    let arena = rt.new_arena();
    let r = arena.alloc_value(3u64).unwrap();
    drop(arena);
    assert!(collect_until(&rt, || r.get().is_err()));
    assert!(matches!(r.get(), Err(ArenaError::Freed { .. })));
}

#[test]
fn recycled_chunks_do_not_retain_stale_pointers() {
    let rt = runtime();
    let ran = Arc::new(AtomicUsize::new(0));
    let object = watched_object(&rt, &ran, Bytes::<1024>::filled(0));
    let base = object.addr();
    // Interior and unaligned, the way a byte pointer into it would be.
    let addr = base.add_bytes(124);

    let first = rt.new_arena();
    let pointers = first.alloc_slice::<Addr>(TEST_CHUNK_WORDS).unwrap();
    pointers.copy_from_slice(&vec![addr; TEST_CHUNK_WORDS]).unwrap();
    first.free().unwrap();
    assert!(collect_until(&rt, || rt.arenas().pooled_chunks() == 1));

    // Same chunk, same bytes, but scalar this time.
    let second = rt.new_arena();
    let scalars = second.alloc_slice::<usize>(TEST_CHUNK_WORDS).unwrap();
    scalars
        .copy_from_slice(&vec![addr.0; TEST_CHUNK_WORDS])
        .unwrap();
    assert_eq!(rt.arena_stats().allocator.reused_chunks, 1);
    assert_eq!(scalars.addr(), pointers.addr());

    drop(object);
    collect_twice(&rt);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(collect_until(&rt, || !rt.heap().contains(base)));
    assert_eq!(scalars.get(0).unwrap(), addr.0);
    assert!(pointers.get(0).is_err());
}

#[test]
fn quarantine_drains_once_every_arena_is_gone() {
    let rt = runtime();
    let mut kept = Vec::new();
    for i in 0..8u64 {
        let arena = rt.new_arena();
        arena.alloc_slice::<u64>(TEST_CHUNK_WORDS).unwrap();
        arena.alloc_value(i).unwrap();
        if i % 2 == 0 {
            arena.free().unwrap();
        } else {
            kept.push(arena);
        }
    }
    assert_eq!(rt.arenas().active_chunks(), 8);
    drop(kept);

    assert!(collect_until(&rt, || rt.waiting_arena_chunks() == 0
        && rt.arenas().active_chunks() == 0));
    let stats = rt.arena_stats();
    assert_eq!(stats.allocator.fresh_chunks + stats.allocator.reused_chunks, 16);
    assert_eq!(stats.allocator.pooled_chunks as u64, stats.allocator.fresh_chunks);
    assert_eq!(stats.allocator.returned_chunks, 0);
}

/// A root scanner that holds nothing and instead runs one queued step from
/// inside the collector's scan, so the step's stores land mid-mark.
#[derive(Default)]
struct MidMark(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl MidMark {
    fn arm(&self, step: impl FnOnce() + Send + 'static) {
        *self.0.lock() = Some(Box::new(step));
    }

    fn fired(&self) -> bool {
        self.0.lock().is_none()
    }
}

impl RootScanner for MidMark {
    fn scan_roots(&self, _tracer: &mut dyn Tracer) {
        let step = self.0.lock().take();
        if let Some(step) = step {
            step();
        }
    }
}

/// A heap whose scanners run in the order: `early` arenas, the mid-mark
/// step, `late` arenas.
struct Staged {
    heap: Heap,
    early: Arc<ArenaRuntime>,
    step: Arc<MidMark>,
    late: Arc<ArenaRuntime>,
}

fn staged() -> Staged {
    init_tracing();
    let heap = Heap::new(GcConfig::default()).unwrap();
    let config = ArenaConfig::new().with_chunk_bytes(TEST_CHUNK_BYTES);
    let early = ArenaRuntime::new(config.clone(), heap.collector()).unwrap();
    let step = Arc::new(MidMark::default());
    let weak = Arc::downgrade(&step);
    let weak: Weak<dyn RootScanner> = weak;
    heap.collector().register_root_scanner(weak);
    let late = ArenaRuntime::new(config, heap.collector()).unwrap();
    Staged {
        heap,
        early,
        step,
        late,
    }
}

#[test]
fn pointer_moved_between_arena_slots_during_marking_survives() {
    let s = staged();
    let dst_arena = s.early.new_arena();
    let src_arena = s.late.new_arena();
    let dst = dst_arena.alloc_value(Addr::NULL).unwrap();
    let src = src_arena.alloc_value(Addr::NULL).unwrap();

    let target = s.heap.alloc(42u64).unwrap();
    let addr = target.addr();
    src.set(addr).unwrap();
    drop(target);

    // `dst` is scanned before the move and `src` after it.
    {
        let (src, dst) = (src.clone(), dst.clone());
        s.step.arm(move || {
            let moved = src.get().unwrap();
            dst.set(moved).unwrap();
            src.set(Addr::NULL).unwrap();
        });
    }
    s.heap.collect();
    assert!(s.step.fired());
    assert!(s.heap.contains(addr));
    assert_eq!(dst.get().unwrap(), addr);
    assert_eq!(src.get().unwrap(), Addr::NULL);

    s.heap.collect();
    assert_eq!(s.heap.get::<u64>(addr).unwrap(), 42);
}

#[test]
fn pointer_unlinked_during_marking_survives_that_cycle() {
    let s = staged();
    let src_arena = s.late.new_arena();
    let dst_arena = s.early.new_arena();
    let src = src_arena.alloc_value(Addr::NULL).unwrap();
    let dst = dst_arena.alloc_value(Addr::NULL).unwrap();

    let target = s.heap.alloc(43u64).unwrap();
    let addr = target.addr();
    src.set(addr).unwrap();
    drop(target);

    // The only copy leaves arena memory before `src` is scanned.
    let held = Arc::new(Mutex::new(Addr::NULL));
    {
        let (src, held) = (src.clone(), Arc::clone(&held));
        s.step.arm(move || {
            *held.lock() = src.get().unwrap();
            src.set(Addr::NULL).unwrap();
        });
    }
    s.heap.collect();
    assert!(s.step.fired());
    let moved = *held.lock();
    assert_eq!(moved, addr);
    assert!(s.heap.contains(addr));

    dst.set(moved).unwrap();
    s.heap.collect();
    assert_eq!(s.heap.get::<u64>(addr).unwrap(), 43);

    dst.set(Addr::NULL).unwrap();
    s.heap.collect();
    assert!(!s.heap.contains(addr));
}
