//! Proxy lifetime: native reference ownership of Rust-side objects

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use sipbridge_sys::c_void;

use crate::engine;
use crate::handle::ForeignHandle;
use crate::registry;

/// Rust-side representative of one native object.
///
/// A proxy owns exactly one native reference, released when it is dropped.
/// Proxies are only built through [`from_native`], which consults the
/// identity cache first, so at most one is alive per native object.
pub struct Proxy<S> {
    handle: ForeignHandle,
    kind: &'static str,
    token: u64,
    owns_reference: AtomicBool,
    state: S,
}

impl<S> Proxy<S> {
    pub fn handle(&self) -> ForeignHandle {
        self.handle
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Per-type state (event slots for listeners).
    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S> fmt::Debug for Proxy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("token", &self.token)
            .finish()
    }
}

impl<S> Drop for Proxy<S> {
    fn drop(&mut self) {
        registry::forget(self.handle, self.token);
        if self.owns_reference.swap(false, Ordering::AcqRel) {
            tracing::trace!("unref {} {:?}", self.kind, self.handle);
            // SAFETY: this proxy holds one reference on the handle.
            unsafe { (engine::api().object_unref)(self.handle.as_ptr()) };
        }
    }
}

/// A typed wrapper around an `Arc<Proxy<State>>`.
pub trait NativeObject: Clone + Send + Sync + Sized + 'static {
    /// Kind name recorded in the identity cache.
    const KIND: &'static str;

    /// Per-proxy state, created with the proxy.
    type State: Default + Send + Sync + 'static;

    fn from_proxy(proxy: Arc<Proxy<Self::State>>) -> Self;

    fn proxy(&self) -> &Arc<Proxy<Self::State>>;

    fn handle(&self) -> ForeignHandle {
        self.proxy().handle()
    }

    fn downgrade(&self) -> WeakObject<Self> {
        WeakObject {
            proxy: Arc::downgrade(self.proxy()),
        }
    }
}

/// Returns the proxy for a native object, creating it on first sight.
///
/// With `take_reference` the new proxy acquires a native reference of its
/// own; without, it adopts the caller's reference (fresh results of create
/// calls). When a proxy already exists an adopted reference is released
/// immediately, so the net native refcount change is the same either way.
/// Null yields `None`.
///
/// # Safety
///
/// `ptr` must be null or a live native object of kind `T`, and when
/// `take_reference` is false the caller must own one reference on it.
pub unsafe fn from_native<T: NativeObject>(ptr: *mut c_void, take_reference: bool) -> Option<T> {
    let handle = ForeignHandle::new(ptr)?;
    let mut created = false;
    let proxy = registry::resolve(handle, T::KIND, |token| {
        created = true;
        Arc::new(Proxy {
            handle,
            kind: T::KIND,
            token,
            owns_reference: AtomicBool::new(true),
            state: T::State::default(),
        })
    });
    let api = engine::api();
    match (created, take_reference) {
        (true, true) => {
            tracing::trace!("ref {} {:?}", T::KIND, handle);
            (api.object_ref)(handle.as_ptr());
        }
        (false, false) => (api.object_unref)(handle.as_ptr()),
        _ => {}
    }
    Some(T::from_proxy(proxy))
}

/// Non-owning reference to a proxy.
///
/// Handlers that need their subject beyond the argument they are given hold
/// one of these instead of a clone: a bound listener is owned by its subject,
/// so a handler capturing the subject itself keeps both alive for good.
pub struct WeakObject<T: NativeObject> {
    proxy: Weak<Proxy<T::State>>,
}

impl<T: NativeObject> WeakObject<T> {
    /// The object, if its proxy is still alive.
    pub fn upgrade(&self) -> Option<T> {
        self.proxy.upgrade().map(T::from_proxy)
    }
}

impl<T: NativeObject> Clone for WeakObject<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
        }
    }
}

impl<T: NativeObject> fmt::Debug for WeakObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject<{}>", T::KIND)
    }
}

/// Declares a `NativeObject` wrapper over a raw sys type.
macro_rules! native_object {
    ($(#[$meta:meta])* $name:ident: $raw:ty, state = $state:ty) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(std::sync::Arc<$crate::proxy::Proxy<$state>>);

        impl $crate::proxy::NativeObject for $name {
            const KIND: &'static str = stringify!($name);
            type State = $state;

            fn from_proxy(proxy: std::sync::Arc<$crate::proxy::Proxy<$state>>) -> Self {
                Self(proxy)
            }

            fn proxy(&self) -> &std::sync::Arc<$crate::proxy::Proxy<$state>> {
                &self.0
            }
        }

        impl $name {
            /// Raw native pointer, for calls the bridge does not wrap.
            pub fn as_ptr(&self) -> *mut $raw {
                self.0.handle().cast()
            }

            /// Whether both values are the same proxy.
            pub fn ptr_eq(&self, other: &Self) -> bool {
                std::sync::Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.ptr_eq(other)
            }
        }

        impl Eq for $name {}

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0.handle()).finish()
            }
        }
    };
}

pub(crate) use native_object;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Address, Core};
    use sipbridge_testkit as fake;

    fn setup() {
        crate::engine::install(fake::api()).unwrap();
    }

    #[test]
    fn test_null_yields_none() {
        setup();
        assert!(unsafe { from_native::<Core>(std::ptr::null_mut(), true) }.is_none());
    }

    #[test]
    fn test_take_reference_and_release() {
        setup();
        let raw = fake::new_core();
        let core = unsafe { from_native::<Core>(raw.cast(), true) }.unwrap();
        assert_eq!(fake::refcount(raw), 2);
        assert_eq!(core.proxy().kind(), "Core");

        drop(core);
        assert_eq!(fake::refcount(raw), 1);
        assert_eq!(fake::data_entries(raw), 0);
        unsafe { fake::release(raw) };
        assert!(fake::is_destroyed(raw));
    }

    #[test]
    fn test_adopt_reference() {
        setup();
        let raw = fake::new_core();
        let core = unsafe { from_native::<Core>(raw.cast(), false) }.unwrap();
        assert_eq!(fake::refcount(raw), 1);
        drop(core);
        assert!(fake::is_destroyed(raw));
    }

    #[test]
    fn test_adopting_an_already_proxied_object_releases_the_duplicate() {
        setup();
        let raw = fake::new_core();
        let first = unsafe { from_native::<Core>(raw.cast(), false) }.unwrap();
        fake::retain(raw);
        let second = unsafe { from_native::<Core>(raw.cast(), false) }.unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(fake::refcount(raw), 1);
        drop(first);
        drop(second);
        assert!(fake::is_destroyed(raw));
    }

    #[test]
    fn test_weak_object_does_not_keep_the_proxy() {
        setup();
        let raw = fake::new_core();
        let core = unsafe { from_native::<Core>(raw.cast(), false) }.unwrap();
        let weak = core.downgrade();
        assert!(weak.upgrade().unwrap().ptr_eq(&core));
        assert_eq!(fake::refcount(raw), 1);

        drop(core);
        assert!(weak.upgrade().is_none());
        assert!(fake::is_destroyed(raw));
    }

    #[test]
    #[should_panic(expected = "identity cache holds a Core proxy")]
    fn test_wrong_kind_panics() {
        setup();
        let raw = fake::new_core();
        let _core = unsafe { from_native::<Core>(raw.cast(), true) }.unwrap();
        let _address = unsafe { from_native::<Address>(raw.cast(), true) };
    }
}
