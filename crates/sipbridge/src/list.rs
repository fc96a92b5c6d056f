//! Native cons-cell lists to and from Rust sequences
//!
//! Reading is lazy: [`ObjectList`] and [`StringList`] borrow a native list
//! and walk it through `list_next`/`list_get_data` each time they are
//! iterated, stopping at the end of the list or at the first null element.
//!
//! Writing builds fresh cells with `list_append`. [`NativeObjectList`] points
//! the cells at existing handles and borrows their owners for as long as the
//! list lives. [`NativeStringList`] allocates one buffer per string and keeps
//! them in a [`DisposalSet`]; dropping the list (or calling
//! [`NativeStringList::release`] right after the consuming native call)
//! frees the cells and the buffers.

use std::ffi::CString;
use std::marker::PhantomData;
use std::ptr;

use sipbridge_sys::*;

use crate::engine;
use crate::error::Result;
use crate::marshal;
use crate::proxy::{from_native, NativeObject};

/// Borrowed native list of objects.
pub struct ObjectList<'a, T> {
    head: *const SipList,
    _marker: PhantomData<(&'a SipList, fn() -> T)>,
}

impl<'a, T: NativeObject> ObjectList<'a, T> {
    /// # Safety
    ///
    /// `head` must be null or a native list of `T` objects that stays
    /// unchanged for `'a`.
    pub unsafe fn new(head: *const SipList) -> Self {
        Self {
            head,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Fresh traversal from the head.
    pub fn iter(&self) -> ObjectIter<'a, T> {
        ObjectIter {
            api: engine::api(),
            node: self.head,
            _marker: PhantomData,
        }
    }
}

impl<'a, T: NativeObject> IntoIterator for &ObjectList<'a, T> {
    type Item = T;
    type IntoIter = ObjectIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ObjectIter<'a, T> {
    api: &'static EngineApi,
    node: *const SipList,
    _marker: PhantomData<(&'a SipList, fn() -> T)>,
}

impl<T: NativeObject> Iterator for ObjectIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.node.is_null() {
            return None;
        }
        // SAFETY: `node` is a cell of the list borrowed for 'a.
        let data = unsafe { (self.api.list_get_data)(self.node) };
        if data.is_null() {
            self.node = ptr::null();
            return None;
        }
        // SAFETY: elements are live `T` objects; the list does not own them,
        // so the proxy takes its own reference.
        let item = unsafe { from_native::<T>(data, true) };
        self.node = unsafe { (self.api.list_next)(self.node) };
        item
    }
}

/// Borrowed native list of NUL-terminated strings.
pub struct StringList<'a> {
    head: *const SipList,
    _marker: PhantomData<&'a SipList>,
}

impl<'a> StringList<'a> {
    /// # Safety
    ///
    /// `head` must be null or a native list of string buffers that stays
    /// unchanged for `'a`.
    pub unsafe fn new(head: *const SipList) -> Self {
        Self {
            head,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    pub fn iter(&self) -> StringIter<'a> {
        StringIter {
            api: engine::api(),
            node: self.head,
            _marker: PhantomData,
        }
    }
}

impl<'a> IntoIterator for &StringList<'a> {
    type Item = String;
    type IntoIter = StringIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct StringIter<'a> {
    api: &'static EngineApi,
    node: *const SipList,
    _marker: PhantomData<&'a SipList>,
}

impl Iterator for StringIter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.node.is_null() {
            return None;
        }
        // SAFETY: `node` is a cell of the list borrowed for 'a.
        let data = unsafe { (self.api.list_get_data)(self.node) };
        if data.is_null() {
            self.node = ptr::null();
            return None;
        }
        // SAFETY: elements are NUL-terminated buffers owned by the engine.
        let text = unsafe { marshal::copy_string(data.cast()) };
        self.node = unsafe { (self.api.list_next)(self.node) };
        text
    }
}

/// Buffers the bridge allocated for a native call and must free afterwards.
#[derive(Debug, Default)]
pub struct DisposalSet {
    buffers: Vec<CString>,
}

impl DisposalSet {
    /// Takes ownership of `buffer` and returns its stable address.
    fn track(&mut self, buffer: CString) -> *mut c_void {
        let ptr = buffer.as_ptr() as *mut c_void;
        self.buffers.push(buffer);
        ptr
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Freshly built native list of object handles.
pub struct NativeObjectList<'a> {
    api: &'static EngineApi,
    head: *mut SipList,
    len: usize,
    _elements: PhantomData<&'a ()>,
}

impl<'a> NativeObjectList<'a> {
    pub fn new<T: NativeObject>(items: &'a [T]) -> Self {
        let api = engine::api();
        let head = items.iter().fold(ptr::null_mut(), |head, item| {
            // SAFETY: `head` is null or a list this function built.
            unsafe { (api.list_append)(head, item.handle().as_ptr()) }
        });
        Self {
            api,
            head,
            len: items.len(),
            _elements: PhantomData,
        }
    }

    pub fn as_ptr(&self) -> *const SipList {
        self.head
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for NativeObjectList<'_> {
    fn drop(&mut self) {
        // SAFETY: cells were built by list_append; payloads are not freed.
        unsafe { (self.api.list_free)(self.head) };
    }
}

/// Freshly built native list of strings, owning its buffers.
pub struct NativeStringList {
    api: &'static EngineApi,
    head: *mut SipList,
    buffers: DisposalSet,
}

impl NativeStringList {
    /// Allocates one buffer per string. Fails on an interior NUL, freeing
    /// whatever was already built.
    pub fn new<I, S>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self {
            api: engine::api(),
            head: ptr::null_mut(),
            buffers: DisposalSet::default(),
        };
        for item in items {
            let buffer = list.buffers.track(marshal::to_cstring(item.as_ref())?);
            // SAFETY: `head` is null or a list built here.
            list.head = unsafe { (list.api.list_append)(list.head, buffer) };
        }
        Ok(list)
    }

    pub fn as_ptr(&self) -> *const SipList {
        self.head
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn disposal_set(&self) -> &DisposalSet {
        &self.buffers
    }

    /// Frees the cells and buffers now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for NativeStringList {
    fn drop(&mut self) {
        // SAFETY: cells were built by list_append and are freed once; the
        // buffers they point at are dropped right after.
        unsafe { (self.api.list_free)(self.head) };
        self.head = ptr::null_mut();
        tracing::trace!("released {} string buffers", self.buffers.len());
    }
}
