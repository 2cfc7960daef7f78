//! Typed handles into arena memory.
//!
//! An [`ArenaRef`] or [`ArenaSlice`] remembers the chunk, word offset and
//! chunk *lease* it was allocated under. Every access re-checks that the
//! chunk is still active under that lease, so a handle that outlives its
//! arena's `free` (or the chunk's recycling into another arena) gets
//! [`ArenaError::Freed`] instead of someone else's data.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use burrow_core::{Addr, ArenaId, Collector, Record, Word};
use smallvec::{smallvec, SmallVec};

use crate::chunk::Chunk;
use crate::error::ArenaError;

/// Where an allocation landed.
#[derive(Debug)]
pub(crate) struct Placement {
    pub(crate) chunk: Arc<Chunk>,
    pub(crate) offset: usize,
    pub(crate) lease: u64,
}

#[derive(Clone)]
enum Slot {
    /// Zero-length slice. Address is null.
    Empty,
    /// Zero-sized type. Address is the shared sentinel.
    ZeroSized,
    Chunk(ChunkSlot),
}

#[derive(Clone)]
struct ChunkSlot {
    chunk: Arc<Chunk>,
    offset: usize,
    lease: u64,
    arena: ArenaId,
    collector: Arc<dyn Collector>,
}

impl ChunkSlot {
    fn at(&self, words: usize) -> Self {
        Self {
            offset: self.offset + words,
            ..self.clone()
        }
    }

    fn freed(&self) -> ArenaError {
        ArenaError::Freed { arena: self.arena }
    }

    fn read(&self, word: usize, out: &mut [Word]) -> Result<(), ArenaError> {
        self.chunk
            .with_tenure(self.lease, |c| c.read_words(self.offset + word, out))
            .ok_or_else(|| self.freed())
    }

    /// Store `src` under the write barrier. Pointer words shade both the
    /// value they overwrite and the value they receive.
    fn write(&self, word: usize, src: &[Word]) -> Result<(), ArenaError> {
        let start = self.offset + word;
        self.chunk
            .with_tenure(self.lease, |c| {
                let mut shade = self.collector.write_barrier();
                for (i, &new) in src.iter().enumerate() {
                    if !c.bitmap().is_pointer(start + i) {
                        continue;
                    }
                    let old = c.word(start + i);
                    if old != 0 {
                        shade.visit(Addr(old));
                    }
                    if new != 0 {
                        shade.visit(Addr(new));
                    }
                }
                c.write_words(start, src);
            })
            .ok_or_else(|| self.freed())
    }
}

impl Slot {
    fn addr(&self) -> Addr {
        match self {
            Self::Empty => Addr::NULL,
            Self::ZeroSized => Addr::zero_base(),
            Self::Chunk(s) => s.chunk.addr_of(s.offset),
        }
    }

    fn chunk(placement: Placement, arena: ArenaId, collector: Arc<dyn Collector>) -> Self {
        Self::Chunk(ChunkSlot {
            chunk: placement.chunk,
            offset: placement.offset,
            lease: placement.lease,
            arena,
            collector,
        })
    }
}

/// A single value allocated in an arena.
pub struct ArenaRef<T> {
    slot: Slot,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaRef<T> {
    pub(crate) fn zero_sized() -> Self {
        Self::from_slot(Slot::ZeroSized)
    }

    pub(crate) fn new(placement: Placement, arena: ArenaId, collector: Arc<dyn Collector>) -> Self {
        Self::from_slot(Slot::chunk(placement, arena, collector))
    }

    fn from_slot(slot: Slot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Address of the value. Zero-sized values all share
    /// [`Addr::zero_base`].
    pub fn addr(&self) -> Addr {
        self.slot.addr()
    }
}

impl<T: Record> ArenaRef<T> {
    /// Read the value.
    pub fn get(&self) -> Result<T, ArenaError> {
        match &self.slot {
            Slot::Chunk(s) => {
                let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
                s.read(0, &mut buf)?;
                Ok(T::load(&buf))
            }
            _ => Ok(T::load(&[])),
        }
    }

    /// Overwrite the value.
    pub fn set(&self, value: T) -> Result<(), ArenaError> {
        match &self.slot {
            Slot::Chunk(s) => {
                let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
                value.store(&mut buf);
                s.write(0, &buf)
            }
            _ => Ok(()),
        }
    }

    /// Read, modify and write back. Not atomic with respect to other
    /// writers of the same value.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<(), ArenaError> {
        let mut value = self.get()?;
        f(&mut value);
        self.set(value)
    }
}

impl<T> Clone for ArenaRef<T> {
    fn clone(&self) -> Self {
        Self::from_slot(self.slot.clone())
    }
}

impl<T> fmt::Debug for ArenaRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaRef").field("addr", &self.addr()).finish()
    }
}

/// `len` contiguous values allocated in an arena.
pub struct ArenaSlice<T> {
    slot: Slot,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaSlice<T> {
    pub(crate) fn empty() -> Self {
        Self::from_slot(Slot::Empty, 0)
    }

    pub(crate) fn zero_sized(len: usize) -> Self {
        Self::from_slot(Slot::ZeroSized, len)
    }

    pub(crate) fn new(
        placement: Placement,
        len: usize,
        arena: ArenaId,
        collector: Arc<dyn Collector>,
    ) -> Self {
        Self::from_slot(Slot::chunk(placement, arena, collector), len)
    }

    fn from_slot(slot: Slot, len: usize) -> Self {
        Self {
            slot,
            len,
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the slice has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements of storage backing the slice. Equal to `len`: arena slices
    /// never grow.
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Address of element 0. [`Addr::NULL`] for an empty slice,
    /// [`Addr::zero_base`] for zero-sized elements.
    pub fn addr(&self) -> Addr {
        self.slot.addr()
    }

    fn check_index(&self, index: usize) -> Result<(), ArenaError> {
        if index < self.len {
            Ok(())
        } else {
            Err(ArenaError::IndexOutOfBounds {
                index,
                len: self.len,
            })
        }
    }
}

impl<T: Record> ArenaSlice<T> {
    /// Read element `index`.
    pub fn get(&self, index: usize) -> Result<T, ArenaError> {
        self.check_index(index)?;
        match &self.slot {
            Slot::Chunk(s) => {
                let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
                s.read(index * T::WORDS, &mut buf)?;
                Ok(T::load(&buf))
            }
            _ => Ok(T::load(&[])),
        }
    }

    /// Overwrite element `index`.
    pub fn set(&self, index: usize, value: T) -> Result<(), ArenaError> {
        self.check_index(index)?;
        match &self.slot {
            Slot::Chunk(s) => {
                let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
                value.store(&mut buf);
                s.write(index * T::WORDS, &buf)
            }
            _ => Ok(()),
        }
    }

    /// Overwrite every element from `src`, which must have exactly `len`
    /// elements.
    pub fn copy_from_slice(&self, src: &[T]) -> Result<(), ArenaError> {
        if src.len() != self.len {
            return Err(ArenaError::LengthMismatch {
                expected: self.len,
                found: src.len(),
            });
        }
        match &self.slot {
            Slot::Chunk(s) => {
                let mut buf = vec![0; self.len * T::WORDS];
                if T::WORDS > 0 {
                    for (value, dst) in src.iter().zip(buf.chunks_exact_mut(T::WORDS)) {
                        value.store(dst);
                    }
                }
                s.write(0, &buf)
            }
            _ => Ok(()),
        }
    }

    /// Read every element.
    pub fn to_vec(&self) -> Result<Vec<T>, ArenaError> {
        match &self.slot {
            Slot::Chunk(s) if T::WORDS > 0 => {
                let mut buf = vec![0; self.len * T::WORDS];
                s.read(0, &mut buf)?;
                Ok(buf.chunks_exact(T::WORDS).map(T::load).collect())
            }
            _ => Ok((0..self.len).map(|_| T::load(&[])).collect()),
        }
    }

    /// Handle to element `index`, or `None` if out of bounds.
    pub fn element(&self, index: usize) -> Option<ArenaRef<T>> {
        if index >= self.len {
            return None;
        }
        let slot = match &self.slot {
            Slot::Chunk(s) => Slot::Chunk(s.at(index * T::WORDS)),
            other => other.clone(),
        };
        Some(ArenaRef::from_slot(slot))
    }
}

impl<T> Clone for ArenaSlice<T> {
    fn clone(&self) -> Self {
        Self::from_slot(self.slot.clone(), self.len)
    }
}

impl<T> fmt::Debug for ArenaSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaSlice")
            .field("addr", &self.addr())
            .field("len", &self.len)
            .finish()
    }
}
