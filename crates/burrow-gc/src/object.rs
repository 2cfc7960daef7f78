//! Heap objects.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use burrow_core::{Addr, OutOfMemory, TypeLayout, WordBuf};
use parking_lot::Mutex;

/// Finalizer attached to one object, called with the object's address.
pub(crate) type ObjectFinalizer = Box<dyn FnOnce(Addr) + Send + 'static>;

/// A heap object: its words, its pointer layout and its mark.
pub(crate) struct Object {
    words: WordBuf,
    layout: TypeLayout,
    /// Epoch of the last cycle that marked this object.
    mark: AtomicU64,
    finalizer: Mutex<Option<ObjectFinalizer>>,
}

impl Object {
    pub(crate) fn new(layout: TypeLayout, mark: u64) -> Result<Self, OutOfMemory> {
        Ok(Self {
            words: WordBuf::zeroed(layout.words())?,
            layout,
            mark: AtomicU64::new(mark),
            finalizer: Mutex::new(None),
        })
    }

    pub(crate) fn base(&self) -> Addr {
        self.words.addr()
    }

    pub(crate) fn words(&self) -> &WordBuf {
        &self.words
    }

    pub(crate) fn layout(&self) -> &TypeLayout {
        &self.layout
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.words.size_bytes()
    }

    /// Mark for `epoch`. Returns `true` if the object was not yet marked.
    pub(crate) fn try_mark(&self, epoch: u64) -> bool {
        self.mark.swap(epoch, Ordering::AcqRel) != epoch
    }

    pub(crate) fn is_marked(&self, epoch: u64) -> bool {
        self.mark.load(Ordering::Acquire) == epoch
    }

    pub(crate) fn set_finalizer(&self, f: ObjectFinalizer) {
        *self.finalizer.lock() = Some(f);
    }

    pub(crate) fn has_finalizer(&self) -> bool {
        self.finalizer.lock().is_some()
    }

    pub(crate) fn take_finalizer(&self) -> Option<ObjectFinalizer> {
        self.finalizer.lock().take()
    }

    /// Non-null values of this object's pointer words.
    pub(crate) fn for_each_pointer(&self, mut f: impl FnMut(Addr)) {
        for i in self.layout.pointer_words() {
            let w = self.words.load(i);
            if w != 0 {
                f(Addr(w));
            }
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("base", &self.base())
            .field("words", &self.layout.words())
            .field("pointers", &self.layout.pointer_count())
            .finish_non_exhaustive()
    }
}
