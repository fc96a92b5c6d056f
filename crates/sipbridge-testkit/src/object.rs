//! Fake reference-counted objects with a keyed user-data side table
//!
//! Object memory is never returned to the allocator: a destroyed object stays
//! readable so tests can inspect it afterwards, and its address is never
//! reused by a later allocation.

use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sipbridge_sys::*;

/// Kind tag, checked on every typed entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Factory,
    Core,
    Call,
    Address,
    CoreCbs,
    CallCbs,
}

pub(crate) struct DataEntry {
    key: CString,
    value: *mut c_void,
    destroy: Option<DataDestroyFn>,
}

impl DataEntry {
    /// Runs the destroy callback, if any. Must be called with no lock held.
    unsafe fn run_destroy(self) {
        if let Some(destroy) = self.destroy {
            destroy(self.value);
        }
    }
}

pub(crate) struct CoreBody {
    pub version: CString,
    pub config_path: Option<String>,
    pub started: bool,
    pub iterations: usize,
    pub mic: bool_t,
    pub network_reachable: bool_t,
    pub calls: Vec<*mut FakeObject>,
    pub calls_list: ListCells,
    pub tags: Vec<CString>,
    pub tags_list: ListCells,
    pub callbacks: Vec<*mut FakeObject>,
    pub current_cbs: *mut FakeObject,
}

impl CoreBody {
    pub fn new(version: CString, config_path: Option<String>) -> Self {
        Self {
            version,
            config_path,
            started: false,
            iterations: 0,
            mic: 1,
            network_reachable: 1,
            calls: Vec::new(),
            calls_list: ListCells::default(),
            tags: Vec::new(),
            tags_list: ListCells::default(),
            callbacks: Vec::new(),
            current_cbs: ptr::null_mut(),
        }
    }
}

pub(crate) struct CallBody {
    pub core: *mut FakeObject,
    pub remote: *mut FakeObject,
    pub state: c_int,
    pub recording: bool_t,
    pub dtmfs: String,
    pub callbacks: Vec<*mut FakeObject>,
    pub current_cbs: *mut FakeObject,
}

impl CallBody {
    pub fn new(core: *mut FakeObject, remote: *mut FakeObject, state: c_int) -> Self {
        Self {
            core,
            remote,
            state,
            recording: 0,
            dtmfs: String::new(),
            callbacks: Vec::new(),
            current_cbs: ptr::null_mut(),
        }
    }
}

pub(crate) struct AddressBody {
    pub username: Option<CString>,
    pub domain: CString,
    pub display_name: Option<CString>,
    pub secure: bool_t,
}

#[derive(Default, Clone, Copy)]
pub(crate) struct CoreCbsBody {
    pub global_state_changed: Option<CoreGlobalStateChangedFn>,
    pub call_state_changed: Option<CoreCallStateChangedFn>,
    pub network_reachable: Option<CoreNetworkReachableFn>,
}

#[derive(Default, Clone, Copy)]
pub(crate) struct CallCbsBody {
    pub state_changed: Option<CallStateChangedFn>,
    pub dtmf_received: Option<CallDtmfReceivedFn>,
}

pub(crate) enum Body {
    Factory,
    Core(CoreBody),
    Call(CallBody),
    Address(AddressBody),
    CoreCbs(CoreCbsBody),
    CallCbs(CallCbsBody),
}

impl Body {
    fn kind(&self) -> Kind {
        match self {
            Body::Factory => Kind::Factory,
            Body::Core(_) => Kind::Core,
            Body::Call(_) => Kind::Call,
            Body::Address(_) => Kind::Address,
            Body::CoreCbs(_) => Kind::CoreCbs,
            Body::CallCbs(_) => Kind::CallCbs,
        }
    }

    /// Detaches every owned child reference so the caller can release them.
    fn take_children(&mut self) -> Vec<*mut FakeObject> {
        match self {
            Body::Core(core) => {
                core.current_cbs = ptr::null_mut();
                core.calls_list.clear();
                core.tags_list.clear();
                let mut children = std::mem::take(&mut core.calls);
                children.append(&mut core.callbacks);
                children
            }
            Body::Call(call) => {
                call.current_cbs = ptr::null_mut();
                let mut children = std::mem::take(&mut call.callbacks);
                if !call.remote.is_null() {
                    children.push(std::mem::replace(&mut call.remote, ptr::null_mut()));
                }
                children
            }
            _ => Vec::new(),
        }
    }
}

/// Cons cells owned by a fake object (the lists it hands out as `const`).
pub(crate) struct ListCells(pub *mut SipList);

impl Default for ListCells {
    fn default() -> Self {
        Self(ptr::null_mut())
    }
}

impl ListCells {
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = *mut c_void>) {
        self.clear();
        for item in items {
            // SAFETY: the list is either null or built by list_append.
            self.0 = unsafe { crate::list::append(self.0, item) };
        }
    }

    pub fn clear(&mut self) {
        // SAFETY: cells were allocated by list_append and are not shared.
        unsafe { crate::list::free(self.0) };
        self.0 = ptr::null_mut();
    }
}

pub(crate) struct FakeObject {
    kind: Kind,
    refs: AtomicUsize,
    destroyed: AtomicBool,
    data: Mutex<Vec<DataEntry>>,
    pub body: Mutex<Body>,
}

impl FakeObject {
    /// Allocates an object holding one reference owned by the creator.
    pub fn alloc(body: Body) -> *mut FakeObject {
        Box::into_raw(Box::new(FakeObject {
            kind: body.kind(),
            refs: AtomicUsize::new(1),
            destroyed: AtomicBool::new(false),
            data: Mutex::new(Vec::new()),
            body: Mutex::new(body),
        }))
    }

    /// # Safety
    ///
    /// `obj` must have been returned by [`FakeObject::alloc`].
    pub unsafe fn from_ptr<'a>(obj: *const c_void) -> &'a FakeObject {
        assert!(!obj.is_null(), "null object passed to the fake engine");
        &*obj.cast::<FakeObject>()
    }

    /// # Safety
    ///
    /// Same as [`FakeObject::from_ptr`]; additionally asserts the kind.
    pub unsafe fn typed<'a, T>(obj: *const T, kind: Kind) -> &'a FakeObject {
        let object = Self::from_ptr(obj.cast());
        assert_eq!(object.kind, kind, "fake engine received the wrong object kind");
        object
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn refcount(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn retain(&self) {
        assert!(!self.is_destroyed(), "ref taken on a destroyed {:?}", self.kind);
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// # Safety
    ///
    /// `obj` must have been returned by [`FakeObject::alloc`].
    pub unsafe fn release(obj: *mut FakeObject) {
        let object = &*obj;
        let previous = object.refs.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "refcount underflow on {:?}", object.kind);
        if previous == 1 {
            object.destroy();
        }
    }

    unsafe fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        let entries = std::mem::take(&mut *self.data.lock());
        for entry in entries {
            entry.run_destroy();
        }
        let children = self.body.lock().take_children();
        for child in children {
            Self::release(child);
        }
    }

    pub fn data_len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn data_get(&self, key: &CStr) -> *mut c_void {
        self.data
            .lock()
            .iter()
            .find(|entry| entry.key.as_c_str() == key)
            .map_or(ptr::null_mut(), |entry| entry.value)
    }

    /// # Safety
    ///
    /// `destroy` must be safe to call with `value`.
    pub unsafe fn data_set(&self, key: &CStr, value: *mut c_void, destroy: Option<DataDestroyFn>) -> c_int {
        if self.is_destroyed() {
            return -1;
        }
        let entry = DataEntry {
            key: key.to_owned(),
            value,
            destroy,
        };
        let replaced = {
            let mut data = self.data.lock();
            match data.iter_mut().find(|existing| existing.key.as_c_str() == key) {
                Some(existing) => Some(std::mem::replace(existing, entry)),
                None => {
                    data.push(entry);
                    None
                }
            }
        };
        if let Some(old) = replaced {
            old.run_destroy();
        }
        0
    }

    /// # Safety
    ///
    /// The stored destroy callback must still be safe to call.
    pub unsafe fn data_remove(&self, key: &CStr) -> c_int {
        let removed = {
            let mut data = self.data.lock();
            data.iter()
                .position(|entry| entry.key.as_c_str() == key)
                .map(|index| data.remove(index))
        };
        match removed {
            Some(entry) => {
                entry.run_destroy();
                0
            }
            None => -1,
        }
    }
}
