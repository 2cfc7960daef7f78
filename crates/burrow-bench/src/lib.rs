//! Benchmark profiles and utilities for Burrow.
//!
//! - [`reference_profile`]: 64 KiB chunks, default pool and quarantine
//! - [`stress_profile`]: 8 MiB chunks with a small pool, so recycling
//!   spills to the heap
//! - [`populate_pointer_graph`]: an arena full of pointers into the heap

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use burrow::arena::{Arena, ArenaConfig, ArenaSlice};
use burrow::gc::Root;
use burrow::types::Addr;
use burrow::{Runtime, RuntimeConfig, RuntimeError};

/// Chunk size of the reference profile.
pub const REFERENCE_CHUNK_BYTES: usize = 64 * 1024;

/// Small chunks, so allocation-heavy benchmarks cross chunk boundaries
/// often.
pub fn reference_profile() -> RuntimeConfig {
    RuntimeConfig {
        arena: ArenaConfig::new().with_chunk_bytes(REFERENCE_CHUNK_BYTES),
        ..RuntimeConfig::default()
    }
}

/// Full-size chunks and a pool of four.
pub fn stress_profile() -> RuntimeConfig {
    RuntimeConfig {
        arena: ArenaConfig {
            pool_capacity: 4,
            ..ArenaConfig::new()
        },
        ..RuntimeConfig::default()
    }
}

/// Allocate `objects` heap values and store a pointer to each in a fresh
/// slice of `arena`. Returns the slice and the roots, which the caller
/// drops to leave the arena as the only path to the objects.
pub fn populate_pointer_graph(
    runtime: &Runtime,
    arena: &Arena,
    objects: usize,
) -> Result<(ArenaSlice<Addr>, Vec<Root<u64>>), RuntimeError> {
    let slots = arena.alloc_slice::<Addr>(objects)?;
    let mut roots = Vec::with_capacity(objects);
    for i in 0..objects {
        let root = runtime.heap().alloc(i as u64)?;
        slots.set(i, root.addr())?;
        roots.push(root);
    }
    Ok((slots, roots))
}
