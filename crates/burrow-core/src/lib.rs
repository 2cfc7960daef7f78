//! Core types and traits for the Burrow arena allocator.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions shared by the arena and the collector:
//! word addresses, per-type pointer layouts, the [`Record`] value
//! encoding, atomic word storage, error types, and the collector
//! interface traits.
//!
//! # Memory model
//!
//! All managed memory is a sequence of machine words. Every word lives
//! in an `AtomicUsize`, so a collector thread reading a word while a
//! mutator writes it observes either the old or the new value, never a
//! mix. Whether a word is a pointer is never inferred from its value:
//! it is recorded out-of-band in a [`TypeLayout`] (for heap objects) or
//! a per-chunk pointer bitmap (for arena memory).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("burrow models memory as 64-bit words and requires a 64-bit target");

pub mod error;
pub mod id;
pub mod layout;
pub mod record;
pub mod traits;
pub mod words;

pub use error::OutOfMemory;
pub use id::{Addr, ArenaId, ChunkId, CycleId, Word, WORD_BYTES};
pub use layout::{LayoutBuilder, TypeLayout};
pub use record::{Bytes, Record};
pub use traits::{Collector, CycleObserver, DropFinalizer, RootScanner, Tracer};
pub use words::WordBuf;
