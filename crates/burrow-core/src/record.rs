//! The [`Record`] value encoding.
//!
//! Managed memory is word-addressed, so a value has to say how it maps
//! onto words and which of those words are pointers. [`Record`] is that
//! contract. Implementations are provided for the primitive scalars (one
//! word each), [`Addr`] (one pointer word), `()` (zero-sized), pairs,
//! arrays, and [`Bytes`] (packed byte arrays).

use crate::id::{Addr, Word, WORD_BYTES};
use crate::layout::TypeLayout;

/// A value that can live in arena or heap memory.
///
/// `store` and `load` must agree with `layout()`: `store` writes exactly
/// [`WORDS`](Record::WORDS) words, and every word `layout()` marks as a
/// pointer must contain either `0` or an [`Addr`].
pub trait Record: Sized {
    /// Number of words a value occupies.
    const WORDS: usize;

    /// Pointer layout of one value.
    fn layout() -> TypeLayout;

    /// Encode into `out`, which is exactly `WORDS` long.
    fn store(&self, out: &mut [Word]);

    /// Decode from `words`, which is exactly `WORDS` long.
    fn load(words: &[Word]) -> Self;
}

macro_rules! scalar_record {
    ($($t:ty),* $(,)?) => {
        $(
            impl Record for $t {
                const WORDS: usize = 1;

                fn layout() -> TypeLayout {
                    TypeLayout::scalar(1)
                }

                fn store(&self, out: &mut [Word]) {
                    out[0] = *self as Word;
                }

                fn load(words: &[Word]) -> Self {
                    words[0] as $t
                }
            }
        )*
    };
}

scalar_record!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl Record for bool {
    const WORDS: usize = 1;

    fn layout() -> TypeLayout {
        TypeLayout::scalar(1)
    }

    fn store(&self, out: &mut [Word]) {
        out[0] = *self as Word;
    }

    fn load(words: &[Word]) -> Self {
        words[0] != 0
    }
}

impl Record for f32 {
    const WORDS: usize = 1;

    fn layout() -> TypeLayout {
        TypeLayout::scalar(1)
    }

    fn store(&self, out: &mut [Word]) {
        out[0] = self.to_bits() as Word;
    }

    fn load(words: &[Word]) -> Self {
        f32::from_bits(words[0] as u32)
    }
}

impl Record for f64 {
    const WORDS: usize = 1;

    fn layout() -> TypeLayout {
        TypeLayout::scalar(1)
    }

    fn store(&self, out: &mut [Word]) {
        out[0] = self.to_bits() as Word;
    }

    fn load(words: &[Word]) -> Self {
        f64::from_bits(words[0] as u64)
    }
}

impl Record for () {
    const WORDS: usize = 0;

    fn layout() -> TypeLayout {
        TypeLayout::zero_sized()
    }

    fn store(&self, _out: &mut [Word]) {}

    fn load(_words: &[Word]) -> Self {}
}

impl Record for Addr {
    const WORDS: usize = 1;

    fn layout() -> TypeLayout {
        TypeLayout::pointer()
    }

    fn store(&self, out: &mut [Word]) {
        out[0] = self.0;
    }

    fn load(words: &[Word]) -> Self {
        Addr(words[0])
    }
}

impl<A: Record, B: Record> Record for (A, B) {
    const WORDS: usize = A::WORDS + B::WORDS;

    fn layout() -> TypeLayout {
        TypeLayout::builder()
            .push_layout(&A::layout())
            .push_layout(&B::layout())
            .build()
    }

    fn store(&self, out: &mut [Word]) {
        let (a, b) = out.split_at_mut(A::WORDS);
        self.0.store(a);
        self.1.store(b);
    }

    fn load(words: &[Word]) -> Self {
        let (a, b) = words.split_at(A::WORDS);
        (A::load(a), B::load(b))
    }
}

impl<T: Record, const N: usize> Record for [T; N] {
    const WORDS: usize = T::WORDS * N;

    fn layout() -> TypeLayout {
        T::layout()
            .array(N)
            .unwrap_or_else(|| TypeLayout::scalar(Self::WORDS))
    }

    fn store(&self, out: &mut [Word]) {
        if T::WORDS == 0 {
            return;
        }
        for (elem, dst) in self.iter().zip(out.chunks_exact_mut(T::WORDS)) {
            elem.store(dst);
        }
    }

    fn load(words: &[Word]) -> Self {
        std::array::from_fn(|i| T::load(&words[i * T::WORDS..(i + 1) * T::WORDS]))
    }
}

/// `N` bytes packed little-endian into `ceil(N / 8)` scalar words.
///
/// Use this instead of `[u8; N]`, which spends a full word per byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bytes<const N: usize>(pub [u8; N]);

impl<const N: usize> Bytes<N> {
    /// Every byte set to `value`.
    pub fn filled(value: u8) -> Self {
        Self([value; N])
    }
}

impl<const N: usize> Record for Bytes<N> {
    const WORDS: usize = N.div_ceil(WORD_BYTES);

    fn layout() -> TypeLayout {
        TypeLayout::scalar(Self::WORDS)
    }

    fn store(&self, out: &mut [Word]) {
        for (dst, chunk) in out.iter_mut().zip(self.0.chunks(WORD_BYTES)) {
            let mut buf = [0u8; WORD_BYTES];
            buf[..chunk.len()].copy_from_slice(chunk);
            *dst = Word::from_le_bytes(buf);
        }
    }

    fn load(words: &[Word]) -> Self {
        Self(std::array::from_fn(|i| {
            words[i / WORD_BYTES].to_le_bytes()[i % WORD_BYTES]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Record>(value: &T) -> T {
        let mut words = vec![0; T::WORDS];
        value.store(&mut words);
        T::load(&words)
    }

    #[test]
    fn words_agrees_with_layout() {
        assert_eq!(<u8 as Record>::layout().words(), <u8 as Record>::WORDS);
        assert_eq!(<[Addr; 7]>::layout().words(), <[Addr; 7]>::WORDS);
        assert_eq!(<Bytes<11>>::layout().words(), <Bytes<11>>::WORDS);
        assert_eq!(<(Addr, u64)>::layout().words(), <(Addr, u64)>::WORDS);
        assert_eq!(<[(); 4]>::layout().words(), 0);
    }

    #[test]
    fn signed_values_survive_encoding() {
        assert_eq!(round_trip(&-1i8), -1);
        assert_eq!(round_trip(&i64::MIN), i64::MIN);
        assert_eq!(round_trip(&-0.5f32), -0.5);
        assert!(round_trip(&true));
    }

    #[test]
    fn bytes_pack_into_words() {
        assert_eq!(<Bytes<8>>::WORDS, 1);
        assert_eq!(<Bytes<9>>::WORDS, 2);
        assert_eq!(<Bytes<3321>>::WORDS, 416);
        let b = Bytes([1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(round_trip(&b), b);
    }

    #[test]
    fn addr_is_a_pointer_word() {
        assert!(Addr::layout().is_pointer(0));
        let pair = <(u64, Addr)>::layout();
        assert!(!pair.is_pointer(0));
        assert!(pair.is_pointer(1));
    }

    #[test]
    fn arrays_round_trip() {
        let arr = [Addr(8), Addr(16), Addr(24)];
        assert_eq!(round_trip(&arr), arr);
        let nested = [[1u32, 2], [3, 4]];
        assert_eq!(round_trip(&nested), nested);
    }
}
