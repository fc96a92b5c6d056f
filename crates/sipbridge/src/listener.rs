//! Listener binding between subjects and callback-set objects
//!
//! A subject (core, call) owns at most one bound listener. The binding is a
//! field of the subject's identity-cache slot holding a strong reference to
//! the listener proxy, so a listener lives exactly as long as it is bound to
//! a live subject proxy or referenced from Rust.
//!
//! Ownership runs one way: subject, then listener, then handlers. A handler
//! gets its subject as an argument on every event and must not capture a
//! clone of it, or of anything owning it: the subject would then own itself
//! and neither it nor its listener would ever be released. Capture a
//! [`WeakObject`](crate::WeakObject) when a handler needs the subject
//! outside its own invocations, or call `clear_listener` before letting go.
//!
//! Binding only records state under the arena lock. Native attach and detach
//! calls run afterwards; a binder that loses a race with a concurrent binder
//! sees its binding gone once it has attached and detaches again.

use std::sync::Arc;

use parking_lot::RwLock;
use sipbridge_sys::EngineApi;

use crate::error::{BridgeError, Result};
use crate::handle::ForeignHandle;
use crate::proxy::{NativeObject, Proxy};
use crate::registry::{self, BindMode, ListenerBinding, Rebind};

/// Handler slot of one listener event.
pub struct EventSlot<F: ?Sized> {
    handler: RwLock<Option<Arc<F>>>,
}

impl<F: ?Sized> Default for EventSlot<F> {
    fn default() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }
}

impl<F: ?Sized> EventSlot<F> {
    pub(crate) fn set(&self, handler: Option<Arc<F>>) {
        *self.handler.write() = handler;
    }

    /// Current handler, cloned out so it runs without the slot locked.
    pub(crate) fn get(&self) -> Option<Arc<F>> {
        self.handler.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.handler.read().is_some()
    }
}

/// An object that emits events to an attached callback set.
pub(crate) trait Subject: NativeObject {
    type Listener: NativeObject;

    fn create_listener() -> Result<Self::Listener>;

    fn attach(api: &EngineApi, subject: ForeignHandle, cbs: ForeignHandle);

    fn detach(api: &EngineApi, subject: ForeignHandle, cbs: ForeignHandle);

    /// Callback set the engine is dispatching through right now.
    fn current_callbacks(api: &EngineApi, subject: ForeignHandle) -> Option<ForeignHandle>;
}

/// Bound listener of `subject`, if any.
pub(crate) fn bound<S: Subject>(subject: &S) -> Option<S::Listener> {
    let (_, listener) = registry::binding(subject.handle())?;
    downcast_listener::<S::Listener>(listener)
}

pub(crate) fn downcast_listener<L: NativeObject>(listener: Arc<registry::AnyProxy>) -> Option<L> {
    listener.downcast::<Proxy<L::State>>().ok().map(L::from_proxy)
}

/// Bound listener of `subject`, creating and binding one on first access.
pub(crate) fn get_or_bind<S: Subject>(subject: &S) -> Result<S::Listener> {
    if let Some(listener) = bound(subject) {
        return Ok(listener);
    }
    let listener = S::create_listener()?;
    tracing::debug!("created {} for {:?}", <S::Listener as NativeObject>::KIND, subject.handle());
    match bind_with(subject, &listener, BindMode::KeepExisting)? {
        None => Ok(listener),
        // Another thread bound one first; ours is dropped unused.
        Some(existing) => match downcast_listener::<S::Listener>(existing) {
            Some(existing) => Ok(existing),
            None => panic!("listener bound to {:?} is not a {}", subject.handle(), <S::Listener as NativeObject>::KIND),
        },
    }
}

/// Binds `listener` to `subject`. Rebinding the same listener is a no-op;
/// a different one replaces the previous binding, which is detached first.
pub(crate) fn bind<S: Subject>(subject: &S, listener: &S::Listener) -> Result<()> {
    bind_with(subject, listener, BindMode::Replace).map(drop)
}

/// Removes the bound listener of `subject` and detaches its callback set.
pub(crate) fn unbind<S: Subject>(subject: &S) -> Option<S::Listener> {
    let ListenerBinding { cbs, listener, detach } = registry::unbind(subject.handle())?;
    tracing::debug!("clearing listener of {:?}", subject.handle());
    detach(crate::engine::api(), subject.handle(), cbs);
    downcast_listener::<S::Listener>(listener)
}

/// Stores the binding, then performs the native detach/attach it implies.
/// Returns the listener that was kept instead under [`BindMode::KeepExisting`].
fn bind_with<S: Subject>(
    subject: &S,
    listener: &S::Listener,
    mode: BindMode,
) -> Result<Option<Arc<registry::AnyProxy>>> {
    let api = crate::engine::api();
    let handle = subject.handle();
    let cbs = listener.handle();
    let erased: Arc<registry::AnyProxy> = listener.proxy().clone();
    let binding = ListenerBinding {
        cbs,
        listener: erased,
        detach: S::detach,
    };
    match registry::bind(handle, binding, mode) {
        Rebind::Unchanged => Ok(None),
        Rebind::Kept(existing) => Ok(Some(existing)),
        Rebind::NoSubject => {
            tracing::warn!("{:?} has no identity slot; listener not bound", handle);
            Err(BridgeError::UntrackedSubject { kind: S::KIND, handle })
        }
        Rebind::Replaced(previous) => {
            if let Some(previous) = previous {
                tracing::debug!("replacing listener of {:?}", handle);
                (previous.detach)(api, handle, previous.cbs);
            }
            S::attach(api, handle, cbs);
            if !registry::is_bound(handle, cbs) {
                tracing::debug!("listener of {:?} replaced concurrently", handle);
                S::detach(api, handle, cbs);
            }
            Ok(None)
        }
    }
}
