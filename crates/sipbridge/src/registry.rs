//! Identity cache: one live proxy per native object
//!
//! The arena maps a native object's address to the slot describing its
//! current proxy. Each slot carries a token id; the same id is written into
//! the native object's own side table under [`PROXY_KEY`], with a destroy
//! callback that prunes the slot when the native side drops the entry. Slots
//! are only ever removed by the holder of the matching id, so an old proxy
//! finishing its drop late can never evict its successor, and a slot whose
//! proxy is still alive survives any native removal of its entry.
//!
//! A subject's listener binding lives on its slot as well, so dispatch needs
//! a single arena lookup to go from an emitting object to its listener.
//!
//! The arena lock only guards bookkeeping. No native call is made and no
//! proxy is dropped while it is held: whatever a critical section displaces
//! is carried out of it and released after unlocking. Native callbacks that
//! re-enter the bridge (token destroy callbacks, dispatch shims on engine
//! threads) therefore never find the lock held by the thread that called
//! into the engine.

use std::any::Any;
use std::collections::HashMap;
use std::ffi::CStr;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::{Mutex, MutexGuard};
use sipbridge_sys::{c_void, EngineApi};

use crate::engine;
use crate::handle::ForeignHandle;

/// Side-table key holding the proxy token.
pub(crate) const PROXY_KEY: &CStr = c"sipbridge.proxy";

pub(crate) type AnyProxy = dyn Any + Send + Sync;

/// Attach or detach a callback set on a subject.
pub(crate) type CallbacksFn = fn(&EngineApi, ForeignHandle, ForeignHandle);

/// Strong link from a subject to the listener that owns its callback set.
pub(crate) struct ListenerBinding {
    pub cbs: ForeignHandle,
    pub listener: Arc<AnyProxy>,
    pub detach: CallbacksFn,
}

impl ListenerBinding {
    /// Detaches the callback set from `subject`, then lets go of the listener.
    fn release(self, api: &EngineApi, subject: ForeignHandle) {
        (self.detach)(api, subject, self.cbs);
    }
}

struct Slot {
    handle: ForeignHandle,
    token: u64,
    kind: &'static str,
    proxy: Weak<AnyProxy>,
    listener: Option<ListenerBinding>,
}

impl Slot {
    fn unbind(self, api: &EngineApi) {
        if let Some(binding) = self.listener {
            tracing::debug!("unbinding listener of {:?}", self.handle);
            binding.release(api, self.handle);
        }
    }
}

#[derive(Default)]
struct Arena {
    slots: HashMap<usize, Slot>,
}

static ARENA: LazyLock<Mutex<Arena>> = LazyLock::new(|| Mutex::new(Arena::default()));

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

#[cfg(test)]
thread_local! {
    static HOLDING: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Whether the current thread holds the arena lock.
#[cfg(test)]
pub(crate) fn arena_held() -> bool {
    HOLDING.with(std::cell::Cell::get)
}

struct ArenaGuard(MutexGuard<'static, Arena>);

fn arena() -> ArenaGuard {
    let guard = ARENA.lock();
    #[cfg(test)]
    HOLDING.with(|held| held.set(true));
    ArenaGuard(guard)
}

impl Drop for ArenaGuard {
    fn drop(&mut self) {
        #[cfg(test)]
        HOLDING.with(|held| held.set(false));
    }
}

impl Deref for ArenaGuard {
    type Target = Arena;

    fn deref(&self) -> &Arena {
        &self.0
    }
}

impl DerefMut for ArenaGuard {
    fn deref_mut(&mut self) -> &mut Arena {
        &mut self.0
    }
}

/// Heap token stored in the native side table.
struct ProxyToken {
    addr: usize,
    token: u64,
}

unsafe extern "C" fn release_token(data: *mut c_void) {
    if data.is_null() {
        return;
    }
    let token = Box::from_raw(data.cast::<ProxyToken>());
    prune(token.addr, token.token);
}

/// Native side dropped the entry for proxy `token`. The slot goes only if it
/// still belongs to that proxy and the proxy is already gone.
fn prune(addr: usize, token: u64) {
    let removed = {
        let mut arena = arena();
        match arena.slots.get(&addr) {
            Some(slot) if slot.token == token && slot.proxy.strong_count() == 0 => arena.slots.remove(&addr),
            _ => None,
        }
    };
    if let Some(slot) = removed {
        tracing::trace!("native side dropped proxy token {} for {:#x}", token, addr);
        slot.unbind(engine::api());
    }
}

/// Returns the live proxy for `handle`, or stores the one built by `create`.
///
/// `create` receives the new slot's token id and runs under the arena lock,
/// so it must only build the proxy. A live proxy of another kind is a
/// contract violation and panics.
pub(crate) fn resolve<P>(handle: ForeignHandle, kind: &'static str, create: impl FnOnce(u64) -> Arc<P>) -> Arc<P>
where
    P: Any + Send + Sync,
{
    let (proxy, token, stale) = {
        let mut arena = arena();
        let existing = arena
            .slots
            .get(&handle.addr())
            .and_then(|slot| slot.proxy.upgrade().map(|proxy| (slot.kind, proxy)));
        match existing {
            Some(found) => (Err(found), 0, None),
            None => {
                let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
                let proxy = create(token);
                let erased: Arc<AnyProxy> = proxy.clone();
                let stale = arena.slots.insert(
                    handle.addr(),
                    Slot {
                        handle,
                        token,
                        kind,
                        proxy: Arc::downgrade(&erased),
                        listener: None,
                    },
                );
                (Ok(proxy), token, stale)
            }
        }
    };

    let proxy = match proxy {
        Ok(proxy) => proxy,
        Err((existing_kind, proxy)) => {
            if existing_kind != kind {
                panic!(
                    "identity cache holds a {} proxy for {:?}, expected {}",
                    existing_kind, handle, kind
                );
            }
            return match proxy.downcast::<P>() {
                Ok(proxy) => proxy,
                Err(_) => panic!("identity cache proxy for {:?} is not a {}", handle, kind),
            };
        }
    };

    let api = engine::api();
    let data = Box::into_raw(Box::new(ProxyToken {
        addr: handle.addr(),
        token,
    }));
    // SAFETY: the caller guarantees the handle is live, and the destroy
    // callback takes back ownership of `data`.
    let status =
        unsafe { (api.object_data_set)(handle.as_ptr(), PROXY_KEY.as_ptr(), data.cast(), Some(release_token)) };
    if status != 0 {
        tracing::warn!("{:?} refused proxy token (status {})", handle, status);
        // SAFETY: the engine did not take `data`.
        drop(unsafe { Box::from_raw(data) });
    }
    tracing::trace!("{} proxy {} created for {:?}", kind, token, handle);

    if let Some(stale) = stale {
        stale.unbind(api);
    }
    proxy
}

/// Live proxy for `handle`, without creating one.
pub(crate) fn lookup(handle: ForeignHandle) -> Option<Arc<AnyProxy>> {
    let arena = arena();
    arena.slots.get(&handle.addr()).and_then(|slot| slot.proxy.upgrade())
}

/// Called when proxy `token` for `handle` is dropped. Clears the slot and the
/// native side-table entry if they still belong to that proxy, and detaches
/// the subject's listener binding.
pub(crate) fn forget(handle: ForeignHandle, token: u64) {
    let removed = {
        let mut arena = arena();
        match arena.slots.get(&handle.addr()) {
            Some(slot) if slot.token == token => arena.slots.remove(&handle.addr()),
            _ => None,
        }
    };
    let Some(slot) = removed else {
        return;
    };

    let api = engine::api();
    // SAFETY: the dropping proxy still holds its reference. The destroy
    // callback finds no slot for this token and only frees it. If a successor
    // proxy already wrote its entry, that entry goes instead and the
    // successor's slot stays, since its proxy is alive.
    unsafe { (api.object_data_remove)(handle.as_ptr(), PROXY_KEY.as_ptr()) };
    slot.unbind(api);
}

/// Current binding of `subject`: callback-set handle and listener proxy.
pub(crate) fn binding(subject: ForeignHandle) -> Option<(ForeignHandle, Arc<AnyProxy>)> {
    let arena = arena();
    let binding = arena.slots.get(&subject.addr())?.listener.as_ref()?;
    Some((binding.cbs, binding.listener.clone()))
}

/// Whether `cbs` is the callback set bound to `subject`.
pub(crate) fn is_bound(subject: ForeignHandle, cbs: ForeignHandle) -> bool {
    let arena = arena();
    arena
        .slots
        .get(&subject.addr())
        .and_then(|slot| slot.listener.as_ref())
        .is_some_and(|binding| binding.cbs == cbs)
}

/// What [`bind`] does when the subject already has another listener.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum BindMode {
    Replace,
    KeepExisting,
}

/// Outcome of [`bind`].
pub(crate) enum Rebind {
    /// Same callback set already bound; nothing changed.
    Unchanged,
    /// Another listener is bound and was kept.
    Kept(Arc<AnyProxy>),
    /// Binding stored; the previous one, if any, must be released.
    Replaced(Option<ListenerBinding>),
    /// Subject has no slot, the binding was not stored.
    NoSubject,
}

/// Stores `binding` on the subject's slot.
pub(crate) fn bind(subject: ForeignHandle, binding: ListenerBinding, mode: BindMode) -> Rebind {
    let (outcome, unused) = {
        let mut arena = arena();
        match arena.slots.get_mut(&subject.addr()) {
            None => (Rebind::NoSubject, Some(binding)),
            Some(slot) => match &slot.listener {
                Some(bound) if bound.cbs == binding.cbs => (Rebind::Unchanged, Some(binding)),
                Some(bound) if mode == BindMode::KeepExisting => (Rebind::Kept(bound.listener.clone()), Some(binding)),
                _ => (Rebind::Replaced(slot.listener.replace(binding)), None),
            },
        }
    };
    drop(unused);
    outcome
}

/// Takes the subject's binding off its slot. The caller releases it.
pub(crate) fn unbind(subject: ForeignHandle) -> Option<ListenerBinding> {
    let mut arena = arena();
    arena.slots.get_mut(&subject.addr())?.listener.take()
}

/// Drops the slot of `handle` whatever its state, leaving the proxy
/// untracked.
#[cfg(test)]
pub(crate) fn evict(handle: ForeignHandle) {
    let removed = arena().slots.remove(&handle.addr());
    if let Some(slot) = removed {
        slot.unbind(engine::api());
    }
}

/// What a dispatch shim needs to deliver an event on `subject`.
pub(crate) struct DispatchTarget {
    pub subject: Arc<AnyProxy>,
    pub cbs: ForeignHandle,
    pub listener: Arc<AnyProxy>,
}

/// Resolves a subject's live proxy and binding without creating anything.
pub(crate) fn dispatch_target(subject: ForeignHandle) -> Option<DispatchTarget> {
    let arena = arena();
    let slot = arena.slots.get(&subject.addr())?;
    let binding = slot.listener.as_ref()?;
    let proxy = slot.proxy.upgrade()?;
    Some(DispatchTarget {
        subject: proxy,
        cbs: binding.cbs,
        listener: binding.listener.clone(),
    })
}

/// `(tracked slots, bound listeners)`.
pub(crate) fn counts() -> (usize, usize) {
    let arena = arena();
    let bound = arena.slots.values().filter(|slot| slot.listener.is_some()).count();
    (arena.slots.len(), bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use sipbridge_testkit as fake;

    struct Dummy(u64);

    fn slot_token(handle: ForeignHandle) -> Option<u64> {
        arena().slots.get(&handle.addr()).map(|slot| slot.token)
    }

    fn core_handle() -> ForeignHandle {
        crate::engine::install(fake::api()).unwrap();
        ForeignHandle::new(fake::new_core()).unwrap()
    }

    #[test]
    fn test_resolve_reuses_live_proxy() {
        let handle = core_handle();
        let first = resolve(handle, "Dummy", |token| Arc::new(Dummy(token)));
        let second = resolve::<Dummy>(handle, "Dummy", |_| panic!("must reuse"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fake::data_entries(handle.as_ptr()), 1);
        assert!(lookup(handle).is_some());

        let token = first.0;
        drop((first, second));
        forget(handle, token);
        assert!(lookup(handle).is_none());
        assert_eq!(fake::data_entries(handle.as_ptr()), 0);
    }

    #[test]
    fn test_forget_with_stale_token_keeps_successor() {
        let handle = core_handle();
        let first = resolve(handle, "Dummy", |token| Arc::new(Dummy(token)));
        let old_token = first.0;
        drop(first);

        let second = resolve(handle, "Dummy", |token| Arc::new(Dummy(token)));
        assert_ne!(second.0, old_token);

        forget(handle, old_token);
        let again = resolve::<Dummy>(handle, "Dummy", |_| panic!("successor must survive"));
        assert!(Arc::ptr_eq(&second, &again));
        assert_eq!(fake::data_entries(handle.as_ptr()), 1);
        forget(handle, second.0);
    }

    #[test]
    fn test_native_removal_keeps_live_slot() {
        let handle = core_handle();
        let proxy = resolve(handle, "Dummy", |token| Arc::new(Dummy(token)));
        assert_eq!(fake::data_remove(handle.as_ptr(), PROXY_KEY), 0);
        assert_eq!(fake::data_entries(handle.as_ptr()), 0);
        assert_eq!(slot_token(handle), Some(proxy.0));

        let again = resolve::<Dummy>(handle, "Dummy", |_| panic!("live slot must survive"));
        assert!(Arc::ptr_eq(&proxy, &again));
        forget(handle, proxy.0);
        assert!(lookup(handle).is_none());
    }

    static DETACHED: AtomicUsize = AtomicUsize::new(0);

    fn count_detach(_: &EngineApi, _: ForeignHandle, _: ForeignHandle) {
        DETACHED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_native_removal_prunes_dead_slot_and_detaches() {
        let handle = core_handle();
        let proxy = resolve(handle, "Dummy", |token| Arc::new(Dummy(token)));
        let token = proxy.0;
        let binding = ListenerBinding {
            cbs: ForeignHandle::new(fake::new_core()).unwrap(),
            listener: Arc::new(Dummy(0)),
            detach: count_detach,
        };
        assert!(matches!(bind(handle, binding, BindMode::Replace), Rebind::Replaced(None)));
        drop(proxy);

        // Dead proxy whose drop has not reached `forget` yet.
        assert_eq!(slot_token(handle), Some(token));
        assert_eq!(fake::data_remove(handle.as_ptr(), PROXY_KEY), 0);
        assert_eq!(slot_token(handle), None);
        assert_eq!(DETACHED.load(Ordering::SeqCst), 1);

        forget(handle, token);
        assert_eq!(DETACHED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bind_keep_existing_and_unbind() {
        let handle = core_handle();
        let _proxy = resolve(handle, "Dummy", |token| Arc::new(Dummy(token)));
        let first_cbs = ForeignHandle::new(fake::new_core()).unwrap();
        let second_cbs = ForeignHandle::new(fake::new_core()).unwrap();
        let make = |cbs: ForeignHandle| ListenerBinding {
            cbs,
            listener: Arc::new(Dummy(0)),
            detach: |_, _, _| {},
        };

        assert!(matches!(bind(handle, make(first_cbs), BindMode::KeepExisting), Rebind::Replaced(None)));
        assert!(matches!(bind(handle, make(first_cbs), BindMode::Replace), Rebind::Unchanged));
        assert!(matches!(bind(handle, make(second_cbs), BindMode::KeepExisting), Rebind::Kept(_)));
        assert!(is_bound(handle, first_cbs));

        match bind(handle, make(second_cbs), BindMode::Replace) {
            Rebind::Replaced(Some(previous)) => assert_eq!(previous.cbs, first_cbs),
            _ => panic!("expected the first binding back"),
        }
        assert!(is_bound(handle, second_cbs));
        assert_eq!(unbind(handle).map(|binding| binding.cbs), Some(second_cbs));
        assert!(binding(handle).is_none());
    }

    #[test]
    fn test_bind_without_slot_is_refused() {
        let handle = core_handle();
        let binding = ListenerBinding {
            cbs: handle,
            listener: Arc::new(Dummy(0)),
            detach: |_, _, _| {},
        };
        assert!(matches!(bind(handle, binding, BindMode::Replace), Rebind::NoSubject));
    }

    #[test]
    #[should_panic(expected = "identity cache holds a Dummy proxy")]
    fn test_kind_mismatch_panics() {
        let handle = core_handle();
        let _proxy = resolve(handle, "Dummy", |token| Arc::new(Dummy(token)));
        let _other = resolve(handle, "Other", |token| Arc::new(Dummy(token)));
    }
}
