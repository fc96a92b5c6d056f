//! Foreign handles: non-null addresses of native reference-counted objects

use std::fmt;
use std::ptr::NonNull;

use sipbridge_sys::c_void;

/// Opaque address of a native object.
///
/// Equality and hashing are by address. The bridge never dereferences a
/// handle; it only passes it back to native entry points.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignHandle(NonNull<c_void>);

// SAFETY: a handle is an address; thread safety of the object it names is the
// native engine's guarantee (atomic refcounts, internally locked state).
unsafe impl Send for ForeignHandle {}
unsafe impl Sync for ForeignHandle {}

impl ForeignHandle {
    /// Wraps a native pointer; `None` for null.
    pub fn new<T>(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr.cast::<c_void>()).map(Self)
    }

    /// Same as [`ForeignHandle::new`] for pointers the engine hands out as `const`.
    pub fn from_const<T>(ptr: *const T) -> Option<Self> {
        Self::new(ptr.cast_mut())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    pub fn cast<T>(self) -> *mut T {
        self.0.as_ptr().cast()
    }

    /// Arena key.
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignHandle({:p})", self.0)
    }
}
