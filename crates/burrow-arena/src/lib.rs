//! User-managed arenas over a tracing collector.
//!
//! An [`Arena`] bump-allocates values into fixed-size chunks and releases
//! them all at once, while a concurrent tracing collector keeps working:
//! every pointer stored in arena memory is visible to it, and no chunk is
//! reused until the collector has proven nothing still points into it.
//!
//! # Architecture
//!
//! ```text
//! Arena (caller handle: chunk list + bump cursor)
//! ├── Chunk[] (WordBuf + PointerBitmap + high-water mark)
//! └── Arc<ArenaRuntime>
//!     ├── ChunkAllocator (acquire / oversized / bounded reuse pool)
//!     ├── active chunk registry   → RootScanner
//!     └── Quarantine              → CycleObserver
//! ```
//!
//! # Chunk life cycle
//!
//! `Active → Quarantined (stamped with cycle g) → bitmap cleared → Pooled
//! or Released`. A chunk leaves quarantine once the collector has
//! completed `g + quarantine_cycles` cycles.
//!
//! # Release
//!
//! [`Arena::free`] releases explicitly. An arena that is dropped without
//! being freed is released by a drop finalizer that the collector runs
//! some time after it notices the arena is gone.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod bitmap;
pub mod chunk;
pub mod config;
pub mod error;
pub mod handle;
pub mod pool;
pub mod quarantine;
pub mod runtime;

pub use arena::Arena;
pub use bitmap::PointerBitmap;
pub use chunk::{Chunk, ChunkKind, ChunkState};
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use handle::{ArenaRef, ArenaSlice};
pub use pool::{AllocatorStats, ChunkAllocator};
pub use quarantine::{Quarantine, QuarantineEntry};
pub use runtime::{ArenaRuntime, RuntimeStats};
