//! Counted root handles.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use burrow_core::{Addr, Collector, Record, Word};
use smallvec::{smallvec, SmallVec};

use crate::collector::GcShared;
use crate::object::Object;

/// A strong reference to a heap value.
///
/// While any `Root` for an object exists, the object and everything
/// reachable from it survives collection. Cloning adds a root; dropping
/// removes one.
pub struct Root<T> {
    shared: Arc<GcShared>,
    /// The object and the word offset of the value in it. `None` for
    /// zero-sized values, which have no object.
    target: Option<(Arc<Object>, usize)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Root<T> {
    pub(crate) fn zero_sized(shared: Arc<GcShared>) -> Self {
        Self {
            shared,
            target: None,
            _marker: PhantomData,
        }
    }

    /// Take over a root count already registered for `object`.
    pub(crate) fn adopt(shared: Arc<GcShared>, object: Arc<Object>, offset: usize) -> Self {
        Self {
            shared,
            target: Some((object, offset)),
            _marker: PhantomData,
        }
    }

    /// Address of the value. Zero-sized values share
    /// [`Addr::zero_base`].
    pub fn addr(&self) -> Addr {
        match &self.target {
            Some((object, offset)) => object.base().add_words(*offset),
            None => Addr::zero_base(),
        }
    }

    pub(crate) fn object(&self) -> Option<&Arc<Object>> {
        self.target.as_ref().map(|(object, _)| object)
    }
}

impl<T: Record> Root<T> {
    /// Read the value.
    pub fn get(&self) -> T {
        match &self.target {
            Some((object, offset)) => {
                let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
                object.words().read_into(*offset, &mut buf);
                T::load(&buf)
            }
            None => T::load(&[]),
        }
    }

    /// Overwrite the value, shading every pointer it replaces and every
    /// pointer it stores.
    pub fn set(&self, value: T) {
        let Some((object, offset)) = &self.target else {
            return;
        };
        let mut buf: SmallVec<[Word; 8]> = smallvec![0; T::WORDS];
        value.store(&mut buf);
        let words = object.words();
        let mut shade = self.shared.write_barrier();
        for (i, &new) in buf.iter().enumerate() {
            if !object.layout().is_pointer(offset + i) {
                continue;
            }
            shade.visit(Addr(words.load(offset + i)));
            shade.visit(Addr(new));
        }
        words.write_from(*offset, &buf);
    }
}

impl<T> Clone for Root<T> {
    fn clone(&self) -> Self {
        if let Some((object, _)) = &self.target {
            self.shared.add_root(object.base());
        }
        Self {
            shared: Arc::clone(&self.shared),
            target: self.target.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for Root<T> {
    fn drop(&mut self) {
        if let Some((object, _)) = &self.target {
            self.shared.remove_root(object.base());
        }
    }
}

impl<T> fmt::Debug for Root<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root").field("addr", &self.addr()).finish()
    }
}
