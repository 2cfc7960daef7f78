//! Test utilities and mock types for Burrow development.
//!
//! Provides the fixture value types used across the arena and collector
//! test suites, a [`MockCollector`] that runs cycles only when told to,
//! and [`init_tracing`] for readable logs under `RUST_LOG`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
mod mock;

pub use fixtures::{Fixture, TEST_CHUNK_BYTES, TEST_CHUNK_WORDS};
pub use mock::MockCollector;

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Filtered by `RUST_LOG` (default `warn`). Safe to call from every test;
/// only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
