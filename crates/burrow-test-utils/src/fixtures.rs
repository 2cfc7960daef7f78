//! Fixture value types.
//!
//! Small, medium and larger-than-a-chunk values, each in a scalar-only and
//! a pointer-bearing variant, plus a mixed layout. Sizes are chosen to hit
//! odd and even word counts and to overflow [`TEST_CHUNK_BYTES`].

use burrow_core::{Addr, Bytes, Record, TypeLayout, Word, WORD_BYTES};

/// Chunk size used by arena tests: 64 KiB.
pub const TEST_CHUNK_BYTES: usize = 64 * 1024;

/// [`TEST_CHUNK_BYTES`] in words.
pub const TEST_CHUNK_WORDS: usize = TEST_CHUNK_BYTES / WORD_BYTES;

/// A fixture with a recognisable sample value.
pub trait Fixture: Record + Clone + PartialEq + std::fmt::Debug + Send + 'static {
    /// A value whose scalar bytes are distinctive and whose pointer words
    /// all hold `target`.
    fn sample(target: Addr) -> Self;
}

macro_rules! newtype_record {
    ($name:ident($inner:ty)) => {
        impl Record for $name {
            const WORDS: usize = <$inner as Record>::WORDS;

            fn layout() -> TypeLayout {
                <$inner as Record>::layout()
            }

            fn store(&self, out: &mut [Word]) {
                self.0.store(out);
            }

            fn load(words: &[Word]) -> Self {
                Self(<$inner as Record>::load(words))
            }
        }
    };
}

/// One scalar word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmallScalar(pub usize);
newtype_record!(SmallScalar(usize));

impl Fixture for SmallScalar {
    fn sample(_target: Addr) -> Self {
        Self(5)
    }
}

/// One pointer word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmallPointer(pub Addr);
newtype_record!(SmallPointer(Addr));

impl Fixture for SmallPointer {
    fn sample(target: Addr) -> Self {
        Self(target)
    }
}

/// Pointer, byte, pointer, 11 bytes: five words, pointers at 0 and 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmallPointerMix {
    pub a: Addr,
    pub b: u8,
    pub c: Addr,
    pub d: Bytes<11>,
}

impl Record for SmallPointerMix {
    const WORDS: usize = 3 + <Bytes<11> as Record>::WORDS;

    fn layout() -> TypeLayout {
        TypeLayout::builder()
            .push_pointer()
            .push_scalar(1)
            .push_pointer()
            .push_layout(&<Bytes<11>>::layout())
            .build()
    }

    fn store(&self, out: &mut [Word]) {
        self.a.store(&mut out[0..1]);
        self.b.store(&mut out[1..2]);
        self.c.store(&mut out[2..3]);
        self.d.store(&mut out[3..]);
    }

    fn load(words: &[Word]) -> Self {
        Self {
            a: Addr::load(&words[0..1]),
            b: u8::load(&words[1..2]),
            c: Addr::load(&words[2..3]),
            d: <Bytes<11>>::load(&words[3..]),
        }
    }
}

impl Fixture for SmallPointerMix {
    fn sample(target: Addr) -> Self {
        Self {
            a: target,
            b: 5,
            c: Addr::NULL,
            d: Bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]),
        }
    }
}

/// 8192 scalar bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediumScalarEven(pub Bytes<8192>);
newtype_record!(MediumScalarEven(Bytes<8192>));

impl Fixture for MediumScalarEven {
    fn sample(_target: Addr) -> Self {
        Self(Bytes::filled(121))
    }
}

/// 3321 scalar bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediumScalarOdd(pub Bytes<3321>);
newtype_record!(MediumScalarOdd(Bytes<3321>));

impl Fixture for MediumScalarOdd {
    fn sample(_target: Addr) -> Self {
        Self(Bytes::filled(122))
    }
}

/// 1024 pointers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediumPointerEven(pub [Addr; 1024]);
newtype_record!(MediumPointerEven([Addr; 1024]));

impl Fixture for MediumPointerEven {
    fn sample(target: Addr) -> Self {
        Self([target; 1024])
    }
}

/// 1023 pointers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediumPointerOdd(pub [Addr; 1023]);
newtype_record!(MediumPointerOdd([Addr; 1023]));

impl Fixture for MediumPointerOdd {
    fn sample(target: Addr) -> Self {
        Self([target; 1023])
    }
}

/// One byte more than a test chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LargeScalar(pub Bytes<{ TEST_CHUNK_BYTES + 1 }>);
newtype_record!(LargeScalar(Bytes<{ TEST_CHUNK_BYTES + 1 }>));

impl Fixture for LargeScalar {
    fn sample(_target: Addr) -> Self {
        Self(Bytes::filled(123))
    }
}

/// One pointer more than a test chunk holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LargePointer(pub [Addr; TEST_CHUNK_WORDS + 1]);
newtype_record!(LargePointer([Addr; TEST_CHUNK_WORDS + 1]));

impl Fixture for LargePointer {
    fn sample(target: Addr) -> Self {
        Self([target; TEST_CHUNK_WORDS + 1])
    }
}
