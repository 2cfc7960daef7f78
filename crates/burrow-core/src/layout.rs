//! Per-type pointer layouts.
//!
//! A [`TypeLayout`] tells the collector, for each word of a value, whether
//! that word holds a pointer. It is the static description consumed by the
//! arena's bitmap manager on every allocation and by the reference heap's
//! tracer when it scans an object.

use smallvec::SmallVec;

use crate::id::WORD_BYTES;

const BITS_PER_MASK_WORD: usize = 64;

/// Word count plus a pointer mask (one bit per word, set = pointer).
///
/// The mask is stored as a dynamically-sized bitset; layouts of up to
/// 128 words stay inline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeLayout {
    words: usize,
    mask: SmallVec<[u64; 2]>,
}

impl TypeLayout {
    /// Layout of a zero-sized type.
    pub fn zero_sized() -> Self {
        Self::scalar(0)
    }

    /// `words` words of scalar data.
    pub fn scalar(words: usize) -> Self {
        Self {
            words,
            mask: SmallVec::from_elem(0, words.div_ceil(BITS_PER_MASK_WORD)),
        }
    }

    /// A single pointer word.
    pub fn pointer() -> Self {
        Self::pointers(1)
    }

    /// `words` consecutive pointer words.
    pub fn pointers(words: usize) -> Self {
        let mut layout = Self::scalar(words);
        let full = words / BITS_PER_MASK_WORD;
        for m in &mut layout.mask[..full] {
            *m = u64::MAX;
        }
        let rem = words % BITS_PER_MASK_WORD;
        if rem != 0 {
            layout.mask[full] = (1u64 << rem) - 1;
        }
        layout
    }

    /// Start building a mixed layout field by field.
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder {
            layout: Self::zero_sized(),
        }
    }

    /// Layout of `[Self; n]`, or `None` if the word count overflows.
    pub fn array(&self, n: usize) -> Option<TypeLayout> {
        self.words.checked_mul(n)?;
        if self.words == 0 {
            return Some(Self::zero_sized());
        }
        let mut builder = Self::builder();
        for _ in 0..n {
            builder = builder.push_layout(self);
        }
        Some(builder.build())
    }

    /// Number of words.
    pub fn words(&self) -> usize {
        self.words
    }

    /// Size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.words * WORD_BYTES
    }

    /// Whether the type occupies no storage.
    pub fn is_zero_sized(&self) -> bool {
        self.words == 0
    }

    /// Whether word `index` holds a pointer. Out-of-range words are scalar.
    pub fn is_pointer(&self, index: usize) -> bool {
        if index >= self.words {
            return false;
        }
        let bit = index % BITS_PER_MASK_WORD;
        self.mask[index / BITS_PER_MASK_WORD] & (1u64 << bit) != 0
    }

    /// Whether any word holds a pointer.
    pub fn has_pointers(&self) -> bool {
        self.mask.iter().any(|&m| m != 0)
    }

    /// Number of pointer words.
    pub fn pointer_count(&self) -> usize {
        self.mask.iter().map(|m| m.count_ones() as usize).sum()
    }

    /// Indices of the pointer words, ascending.
    pub fn pointer_words(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask.iter().enumerate().flat_map(|(i, &m)| {
            let base = i * BITS_PER_MASK_WORD;
            SetBits(m).map(move |bit| base + bit)
        })
    }

    fn set_pointer(&mut self, index: usize) {
        self.mask[index / BITS_PER_MASK_WORD] |= 1u64 << (index % BITS_PER_MASK_WORD);
    }

    fn grow(&mut self, words: usize) {
        self.words += words;
        self.mask.resize(self.words.div_ceil(BITS_PER_MASK_WORD), 0);
    }
}

/// Iterator over the set bit positions of a `u64`, ascending.
struct SetBits(u64);

impl Iterator for SetBits {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

/// Incremental builder for mixed pointer/scalar layouts.
///
/// ```
/// use burrow_core::TypeLayout;
///
/// // struct { a: *T, b: u8, c: *T, d: [u8; 11] }
/// let layout = TypeLayout::builder()
///     .push_pointer()
///     .push_scalar(1)
///     .push_pointer()
///     .push_scalar(2)
///     .build();
/// assert_eq!(layout.words(), 5);
/// assert_eq!(layout.pointer_words().collect::<Vec<_>>(), vec![0, 2]);
/// ```
#[derive(Clone, Debug)]
#[must_use]
pub struct LayoutBuilder {
    layout: TypeLayout,
}

impl LayoutBuilder {
    /// Append `words` scalar words.
    pub fn push_scalar(mut self, words: usize) -> Self {
        self.layout.grow(words);
        self
    }

    /// Append one pointer word.
    pub fn push_pointer(mut self) -> Self {
        let index = self.layout.words;
        self.layout.grow(1);
        self.layout.set_pointer(index);
        self
    }

    /// Append a nested layout.
    pub fn push_layout(mut self, other: &TypeLayout) -> Self {
        let base = self.layout.words;
        self.layout.grow(other.words);
        for p in other.pointer_words() {
            self.layout.set_pointer(base + p);
        }
        self
    }

    /// Finish the layout.
    pub fn build(self) -> TypeLayout {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scalar_layout_has_no_pointers() {
        let l = TypeLayout::scalar(130);
        assert_eq!(l.words(), 130);
        assert!(!l.has_pointers());
        assert_eq!(l.pointer_words().count(), 0);
    }

    #[test]
    fn pointers_layout_covers_every_word() {
        let l = TypeLayout::pointers(129);
        assert_eq!(l.pointer_count(), 129);
        assert!(l.is_pointer(0));
        assert!(l.is_pointer(128));
        assert!(!l.is_pointer(129));
    }

    #[test]
    fn zero_sized_layout() {
        let l = TypeLayout::zero_sized();
        assert!(l.is_zero_sized());
        assert_eq!(l.size_bytes(), 0);
        assert!(!l.has_pointers());
    }

    #[test]
    fn builder_mixes_kinds() {
        let l = TypeLayout::builder()
            .push_scalar(63)
            .push_pointer()
            .push_pointer()
            .build();
        assert_eq!(l.words(), 65);
        assert_eq!(l.pointer_words().collect::<Vec<_>>(), vec![63, 64]);
    }

    #[test]
    fn array_repeats_mask() {
        let elem = TypeLayout::builder().push_pointer().push_scalar(2).build();
        let arr = elem.array(4).unwrap();
        assert_eq!(arr.words(), 12);
        assert_eq!(arr.pointer_words().collect::<Vec<_>>(), vec![0, 3, 6, 9]);
    }

    #[test]
    fn array_of_zero_sized_is_zero_sized() {
        assert!(TypeLayout::zero_sized().array(usize::MAX).unwrap().is_zero_sized());
    }

    proptest! {
        #[test]
        fn array_pointer_count_scales(words in 1usize..40, ptr in 0usize..40, n in 0usize..20) {
            let ptr = ptr % words;
            let elem = TypeLayout::builder()
                .push_scalar(ptr)
                .push_pointer()
                .push_scalar(words - ptr - 1)
                .build();
            let arr = elem.array(n).unwrap();
            prop_assert_eq!(arr.words(), words * n);
            prop_assert_eq!(arr.pointer_count(), n);
            for i in 0..n {
                prop_assert!(arr.is_pointer(i * words + ptr));
            }
        }
    }
}
