//! Released chunks waiting for collector cycles.
//!
//! A chunk enters quarantine stamped with the completed-cycle count at
//! release time. It may leave only once `quarantine_cycles` further cycles
//! have completed: by then every scan that could have been reading the
//! chunk has finished, and nothing reachable still points into it.

use std::collections::VecDeque;
use std::sync::Arc;

use burrow_core::CycleId;
use parking_lot::Mutex;

use crate::chunk::Chunk;

/// A released chunk and the cycle count observed when it was released.
#[derive(Debug)]
pub struct QuarantineEntry {
    /// The chunk.
    pub chunk: Arc<Chunk>,
    /// `completed_cycles()` at release time.
    pub released_at: CycleId,
}

/// The quarantine list.
#[derive(Debug)]
pub struct Quarantine {
    required_cycles: u64,
    entries: Mutex<VecDeque<QuarantineEntry>>,
}

impl Quarantine {
    /// An empty quarantine that holds chunks for `required_cycles` cycles.
    pub fn new(required_cycles: u64) -> Self {
        debug_assert!(required_cycles >= 1);
        Self {
            required_cycles,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Quarantine `chunks`, all released at `released_at`.
    pub fn push_all(&self, chunks: impl IntoIterator<Item = Arc<Chunk>>, released_at: CycleId) {
        let mut entries = self.entries.lock();
        entries.extend(chunks.into_iter().map(|chunk| QuarantineEntry { chunk, released_at }));
    }

    /// Remove and return every chunk whose quarantine has cleared once
    /// `completed` cycles are done.
    pub fn drain_cleared(&self, completed: CycleId) -> Vec<Arc<Chunk>> {
        let mut entries = self.entries.lock();
        let mut cleared = Vec::new();
        let mut kept = VecDeque::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if self.is_cleared(&entry, completed) {
                cleared.push(entry.chunk);
            } else {
                kept.push_back(entry);
            }
        }
        *entries = kept;
        cleared
    }

    /// Number of chunks still waiting.
    pub fn waiting(&self) -> usize {
        self.entries.lock().len()
    }

    fn is_cleared(&self, entry: &QuarantineEntry, completed: CycleId) -> bool {
        completed >= entry.released_at.after(self.required_cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkKind;

    fn chunk() -> Arc<Chunk> {
        Arc::new(Chunk::new(8, ChunkKind::Regular).unwrap())
    }

    #[test]
    fn one_cycle_is_enough_by_default() {
        let q = Quarantine::new(1);
        q.push_all([chunk(), chunk()], CycleId(4));
        assert!(q.drain_cleared(CycleId(4)).is_empty());
        assert_eq!(q.waiting(), 2);
        assert_eq!(q.drain_cleared(CycleId(5)).len(), 2);
        assert_eq!(q.waiting(), 0);
    }

    #[test]
    fn longer_quarantine_holds_back_newer_entries() {
        let q = Quarantine::new(2);
        q.push_all([chunk()], CycleId(0));
        q.push_all([chunk()], CycleId(1));
        assert!(q.drain_cleared(CycleId(1)).is_empty());
        assert_eq!(q.drain_cleared(CycleId(2)).len(), 1);
        assert_eq!(q.waiting(), 1);
        assert_eq!(q.drain_cleared(CycleId(3)).len(), 1);
    }
}
