//! Reference concurrent mark-sweep collector for Burrow.
//!
//! A [`Heap`] owns a set of word-addressed objects, each with a
//! [`TypeLayout`](burrow_core::TypeLayout) saying which of its words are
//! pointers. Objects are kept alive by counted [`Root`]s, by pointers
//! from other live objects, and by whatever registered
//! [`RootScanner`](burrow_core::RootScanner)s report. Arena runtimes plug
//! in through the [`Collector`](burrow_core::Collector) trait returned by
//! [`Heap::collector`].
//!
//! # Threads
//!
//! ```text
//!   mutators ──alloc/set──▶ GcShared ◀──cycle── burrow-gc
//!                              │
//!                      finalizers queued
//!                              ▼
//!                       burrow-finalizer
//! ```
//!
//! Mutators run concurrently with marking. A store made while a cycle is
//! marking shades both the pointer it replaces and the pointer it writes,
//! and objects allocated during a cycle are allocated already marked. Finalizers run
//! on their own thread, never on the collector or on a mutator.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod collector;
pub mod config;
pub mod error;
mod finalizer;
pub mod heap;
mod object;
pub mod root;

pub use config::GcConfig;
pub use error::HeapError;
pub use heap::Heap;
pub use root::Root;
