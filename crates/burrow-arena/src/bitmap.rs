//! Per-chunk pointer/scalar bitmaps.
//!
//! One bit per chunk word: set means the word holds a pointer and the
//! collector must trace it. Bits are only ever *set* by allocation and only
//! ever *cleared* wholesale, once the chunk has left quarantine. A bit is
//! never flipped back to scalar while the chunk is in use, so a scan racing
//! an allocation can see "not yet a pointer" or "pointer", never a stale
//! pointer classification over scalar data.

use std::sync::atomic::{AtomicU64, Ordering};

use burrow_core::{OutOfMemory, TypeLayout};

const BITS: usize = 64;

/// Pointer bitmap covering a fixed number of words.
#[derive(Debug)]
pub struct PointerBitmap {
    bits: Box<[AtomicU64]>,
    words: usize,
}

impl PointerBitmap {
    /// An all-scalar bitmap for `words` words.
    pub fn new(words: usize) -> Result<Self, OutOfMemory> {
        let len = words.div_ceil(BITS);
        let mut v: Vec<AtomicU64> = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| OutOfMemory::system(len.saturating_mul(8)))?;
        v.resize_with(len, || AtomicU64::new(0));
        Ok(Self {
            bits: v.into_boxed_slice(),
            words,
        })
    }

    /// Number of words covered.
    pub fn words(&self) -> usize {
        self.words
    }

    /// Record `count` consecutive values of `layout` starting at word
    /// `offset`.
    ///
    /// Only sets bits. The region must currently be all-scalar, which is
    /// the case for freshly bump-allocated memory in a cleared chunk.
    pub fn mark_region(&self, offset: usize, layout: &TypeLayout, count: usize) {
        let stride = layout.words();
        debug_assert!(offset + stride * count <= self.words);
        debug_assert!(
            self.region_is_scalar(offset, stride * count),
            "pointer bits set over unallocated memory"
        );
        if !layout.has_pointers() {
            return;
        }
        let pointers: Vec<usize> = layout.pointer_words().collect();
        let mut pending: Option<(usize, u64)> = None;
        for rep in 0..count {
            let base = offset + rep * stride;
            for &p in &pointers {
                let word = base + p;
                let (slot, bit) = (word / BITS, 1u64 << (word % BITS));
                pending = match pending {
                    Some((s, mask)) if s == slot => Some((s, mask | bit)),
                    Some((s, mask)) => {
                        self.bits[s].fetch_or(mask, Ordering::Release);
                        Some((slot, bit))
                    }
                    None => Some((slot, bit)),
                };
            }
        }
        if let Some((s, mask)) = pending {
            self.bits[s].fetch_or(mask, Ordering::Release);
        }
    }

    /// Reset every word to scalar.
    pub fn clear(&self) {
        for b in self.bits.iter() {
            b.store(0, Ordering::Release);
        }
    }

    /// Whether word `index` is a pointer.
    pub fn is_pointer(&self, index: usize) -> bool {
        index < self.words
            && self.bits[index / BITS].load(Ordering::Acquire) & (1u64 << (index % BITS)) != 0
    }

    /// Whether every word is scalar.
    pub fn is_clear(&self) -> bool {
        self.bits.iter().all(|b| b.load(Ordering::Acquire) == 0)
    }

    /// Number of pointer words.
    pub fn pointer_count(&self) -> usize {
        self.bits
            .iter()
            .map(|b| b.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Call `f` with the index of every pointer word below `limit`, in
    /// ascending order.
    pub fn for_each_pointer(&self, limit: usize, mut f: impl FnMut(usize)) {
        let limit = limit.min(self.words);
        for (slot, b) in self.bits[..limit.div_ceil(BITS)].iter().enumerate() {
            let mut mask = b.load(Ordering::Acquire);
            let base = slot * BITS;
            if base + BITS > limit {
                mask &= (1u64 << (limit - base)) - 1;
            }
            while mask != 0 {
                let bit = mask.trailing_zeros() as usize;
                f(base + bit);
                mask &= mask - 1;
            }
        }
    }

    fn region_is_scalar(&self, offset: usize, len: usize) -> bool {
        (offset..offset + len).all(|i| !self.is_pointer(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pointers_below(bitmap: &PointerBitmap, limit: usize) -> Vec<usize> {
        let mut out = Vec::new();
        bitmap.for_each_pointer(limit, |i| out.push(i));
        out
    }

    #[test]
    fn new_bitmap_is_clear() {
        let b = PointerBitmap::new(1000).unwrap();
        assert!(b.is_clear());
        assert_eq!(b.words(), 1000);
    }

    #[test]
    fn mark_mixed_layout() {
        let b = PointerBitmap::new(128).unwrap();
        let layout = TypeLayout::builder()
            .push_pointer()
            .push_scalar(1)
            .push_pointer()
            .push_scalar(2)
            .build();
        b.mark_region(3, &layout, 1);
        assert_eq!(pointers_below(&b, 128), vec![3, 5]);
        b.mark_region(8, &layout, 2);
        assert_eq!(pointers_below(&b, 128), vec![3, 5, 8, 10, 13, 15]);
    }

    #[test]
    fn scalar_layout_sets_nothing() {
        let b = PointerBitmap::new(64).unwrap();
        b.mark_region(0, &TypeLayout::scalar(16), 4);
        assert!(b.is_clear());
    }

    #[test]
    fn limit_hides_words_above_high_water() {
        let b = PointerBitmap::new(200).unwrap();
        b.mark_region(0, &TypeLayout::pointers(150), 1);
        assert_eq!(pointers_below(&b, 70).len(), 70);
        assert_eq!(pointers_below(&b, 64).len(), 64);
        assert_eq!(pointers_below(&b, 0).len(), 0);
        assert_eq!(b.pointer_count(), 150);
    }

    #[test]
    fn clear_resets_every_bit() {
        let b = PointerBitmap::new(300).unwrap();
        b.mark_region(0, &TypeLayout::pointer(), 300);
        assert_eq!(b.pointer_count(), 300);
        b.clear();
        assert!(b.is_clear());
        assert!(!b.is_pointer(299));
    }

    proptest! {
        #[test]
        fn marked_bits_match_layout(offset in 0usize..100, count in 0usize..20, ptr in 0usize..5) {
            let b = PointerBitmap::new(256).unwrap();
            let layout = TypeLayout::builder()
                .push_scalar(ptr)
                .push_pointer()
                .push_scalar(4 - ptr.min(4))
                .build();
            let stride = layout.words();
            b.mark_region(offset, &layout, count);
            let expected: Vec<usize> = (0..count).map(|r| offset + r * stride + ptr).collect();
            prop_assert_eq!(pointers_below(&b, 256), expected);
        }
    }
}
