//! Atomic word storage.
//!
//! [`WordBuf`] is the backing store of every chunk and heap object. Each
//! word is an `AtomicUsize`: mutators write with `Release`, the collector
//! reads with `Acquire`, and a concurrent read never tears.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::OutOfMemory;
use crate::id::{Addr, Word, WORD_BYTES};

/// A fixed-length, zero-initialised buffer of atomic words.
///
/// The buffer never moves once allocated, so [`WordBuf::addr`] is stable
/// for its whole lifetime.
#[derive(Debug)]
pub struct WordBuf {
    words: Box<[AtomicUsize]>,
}

impl WordBuf {
    /// Allocate `len` zeroed words, reporting allocator failure instead of
    /// aborting.
    pub fn zeroed(len: usize) -> Result<Self, OutOfMemory> {
        let bytes = len.saturating_mul(WORD_BYTES);
        let mut v: Vec<AtomicUsize> = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| OutOfMemory::system(bytes))?;
        v.resize_with(len, || AtomicUsize::new(0));
        Ok(Self {
            words: v.into_boxed_slice(),
        })
    }

    /// Address of word 0. For an empty buffer this is a dangling but
    /// non-null address that must not be traced.
    pub fn addr(&self) -> Addr {
        Addr(self.words.as_ptr() as usize)
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the buffer has no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.words.len() * WORD_BYTES
    }

    /// Whether `addr` falls inside this buffer.
    pub fn contains(&self, addr: Addr) -> bool {
        let base = self.addr().0;
        addr.0 >= base && addr.0 < base + self.size_bytes()
    }

    /// Word index of `addr`, if it is a word-aligned address inside the
    /// buffer.
    pub fn index_of(&self, addr: Addr) -> Option<usize> {
        if !self.contains(addr) {
            return None;
        }
        let off = addr.0 - self.addr().0;
        (off % WORD_BYTES == 0).then_some(off / WORD_BYTES)
    }

    /// Read word `index`.
    pub fn load(&self, index: usize) -> Word {
        self.words[index].load(Ordering::Acquire)
    }

    /// Write word `index`.
    pub fn store(&self, index: usize, value: Word) {
        self.words[index].store(value, Ordering::Release);
    }

    /// Copy words `start..start + out.len()` into `out`.
    pub fn read_into(&self, start: usize, out: &mut [Word]) {
        let end = start + out.len();
        for (dst, src) in out.iter_mut().zip(&self.words[start..end]) {
            *dst = src.load(Ordering::Acquire);
        }
    }

    /// Copy `src` into words `start..start + src.len()`.
    pub fn write_from(&self, start: usize, src: &[Word]) {
        for (dst, &w) in self.words[start..start + src.len()].iter().zip(src) {
            dst.store(w, Ordering::Release);
        }
    }

    /// Zero every word in `range`.
    pub fn fill_zero(&self, range: Range<usize>) {
        for w in &self.words[range] {
            w.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_buffer_reads_zero() {
        let buf = WordBuf::zeroed(16).unwrap();
        assert_eq!(buf.len(), 16);
        assert!((0..16).all(|i| buf.load(i) == 0));
    }

    #[test]
    fn ranged_copy() {
        let buf = WordBuf::zeroed(8).unwrap();
        buf.write_from(2, &[7, 8, 9]);
        let mut out = [0; 4];
        buf.read_into(1, &mut out);
        assert_eq!(out, [0, 7, 8, 9]);
        buf.fill_zero(3..4);
        assert_eq!(buf.load(3), 0);
        assert_eq!(buf.load(4), 9);
    }

    #[test]
    fn interior_addresses_map_to_indices() {
        let buf = WordBuf::zeroed(4).unwrap();
        let base = buf.addr();
        assert_eq!(buf.index_of(base), Some(0));
        assert_eq!(buf.index_of(base.add_words(3)), Some(3));
        assert_eq!(buf.index_of(base.add_bytes(3)), None);
        assert_eq!(buf.index_of(base.add_words(4)), None);
        assert!(buf.contains(base.add_bytes(3)));
    }

    #[test]
    fn absurd_request_is_out_of_memory() {
        let err = WordBuf::zeroed(usize::MAX / 2).unwrap_err();
        assert!(err.limit.is_none());
    }
}
