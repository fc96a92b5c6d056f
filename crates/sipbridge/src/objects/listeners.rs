//! Core and call listeners and their dispatch shims
//!
//! A listener wraps a native callback set. Registering a handler records it
//! in the listener's event slot and installs the matching shim on the
//! callback set; clearing a handler leaves the shim installed, and the shim
//! then drops the event.
//!
//! A bound listener is owned by its subject, and handlers by their listener.
//! Handlers are therefore given their subject on each call and must never
//! capture it (or a value owning it); hold a [`WeakObject`] for anything
//! longer lived. A captured subject keeps itself alive and is never released.
//!
//! [`WeakObject`]: crate::WeakObject

use std::sync::Arc;

use sipbridge_sys::*;

use crate::dispatch::deliver;
use crate::engine;
use crate::listener::EventSlot;
use crate::marshal;
use crate::objects::{Call, CallState, Core, GlobalState};
use crate::proxy::{from_native, native_object, NativeObject};

pub type GlobalStateHandler = dyn Fn(&Core, GlobalState, &str) + Send + Sync;
pub type CoreCallStateHandler = dyn Fn(&Core, &Call, CallState, &str) + Send + Sync;
pub type NetworkReachableHandler = dyn Fn(&Core, bool) + Send + Sync;
pub type CallStateHandler = dyn Fn(&Call, CallState, &str) + Send + Sync;
pub type DtmfHandler = dyn Fn(&Call, char) + Send + Sync;

/// Handler slots of a [`CoreListener`].
#[derive(Default)]
pub struct CoreListenerState {
    global_state_changed: EventSlot<GlobalStateHandler>,
    call_state_changed: EventSlot<CoreCallStateHandler>,
    network_reachable: EventSlot<NetworkReachableHandler>,
}

/// Handler slots of a [`CallListener`].
#[derive(Default)]
pub struct CallListenerState {
    state_changed: EventSlot<CallStateHandler>,
    dtmf_received: EventSlot<DtmfHandler>,
}

native_object! {
    /// Receives core events once bound with [`Core::listener`] or [`Core::set_listener`].
    CoreListener: SipCoreCbs, state = CoreListenerState
}

native_object! {
    /// Receives call events once bound with [`Call::listener`] or [`Call::set_listener`].
    CallListener: SipCallCbs, state = CallListenerState
}

impl CoreListener {
    fn slots(&self) -> &CoreListenerState {
        self.proxy().state()
    }

    /// Sets the global state handler. The handler gets the emitting core as
    /// its first argument; capturing that core instead would leak it.
    pub fn on_global_state_changed<F>(&self, handler: F)
    where
        F: Fn(&Core, GlobalState, &str) + Send + Sync + 'static,
    {
        let handler: Arc<GlobalStateHandler> = Arc::new(handler);
        self.slots().global_state_changed.set(Some(handler));
        // SAFETY: live callback set; the shim is a plain function.
        unsafe { (engine::api().core_cbs_set_global_state_changed)(self.as_ptr(), Some(global_state_changed_shim)) };
    }

    pub fn clear_global_state_changed(&self) {
        self.slots().global_state_changed.set(None);
    }

    /// Same ownership rule as [`CoreListener::on_global_state_changed`].
    pub fn on_call_state_changed<F>(&self, handler: F)
    where
        F: Fn(&Core, &Call, CallState, &str) + Send + Sync + 'static,
    {
        let handler: Arc<CoreCallStateHandler> = Arc::new(handler);
        self.slots().call_state_changed.set(Some(handler));
        // SAFETY: as above.
        unsafe { (engine::api().core_cbs_set_call_state_changed)(self.as_ptr(), Some(core_call_state_changed_shim)) };
    }

    pub fn clear_call_state_changed(&self) {
        self.slots().call_state_changed.set(None);
    }

    /// Same ownership rule as [`CoreListener::on_global_state_changed`].
    pub fn on_network_reachable<F>(&self, handler: F)
    where
        F: Fn(&Core, bool) + Send + Sync + 'static,
    {
        let handler: Arc<NetworkReachableHandler> = Arc::new(handler);
        self.slots().network_reachable.set(Some(handler));
        // SAFETY: as above.
        unsafe { (engine::api().core_cbs_set_network_reachable)(self.as_ptr(), Some(network_reachable_shim)) };
    }

    pub fn clear_network_reachable(&self) {
        self.slots().network_reachable.set(None);
    }
}

impl CallListener {
    fn slots(&self) -> &CallListenerState {
        self.proxy().state()
    }

    /// Sets the call state handler. Use the call passed in, never a captured
    /// clone of it.
    pub fn on_state_changed<F>(&self, handler: F)
    where
        F: Fn(&Call, CallState, &str) + Send + Sync + 'static,
    {
        let handler: Arc<CallStateHandler> = Arc::new(handler);
        self.slots().state_changed.set(Some(handler));
        // SAFETY: live callback set; the shim is a plain function.
        unsafe { (engine::api().call_cbs_set_state_changed)(self.as_ptr(), Some(call_state_changed_shim)) };
    }

    pub fn clear_state_changed(&self) {
        self.slots().state_changed.set(None);
    }

    /// Same ownership rule as [`CallListener::on_state_changed`].
    pub fn on_dtmf_received<F>(&self, handler: F)
    where
        F: Fn(&Call, char) + Send + Sync + 'static,
    {
        let handler: Arc<DtmfHandler> = Arc::new(handler);
        self.slots().dtmf_received.set(Some(handler));
        // SAFETY: as above.
        unsafe { (engine::api().call_cbs_set_dtmf_received)(self.as_ptr(), Some(dtmf_received_shim)) };
    }

    pub fn clear_dtmf_received(&self) {
        self.slots().dtmf_received.set(None);
    }
}

unsafe extern "C" fn global_state_changed_shim(core: *mut SipCore, state: c_int, message: *const c_char) {
    deliver::<Core, _>("global_state_changed", core.cast(), |core, listener| {
        let Some(handler) = listener.slots().global_state_changed.get() else {
            return false;
        };
        let message = marshal::copy_string(message).unwrap_or_default();
        handler(core, GlobalState::from_raw(state), &message);
        true
    });
}

unsafe extern "C" fn core_call_state_changed_shim(
    core: *mut SipCore,
    call: *mut SipCall,
    state: c_int,
    message: *const c_char,
) {
    deliver::<Core, _>("call_state_changed", core.cast(), |core, listener| {
        let Some(handler) = listener.slots().call_state_changed.get() else {
            return false;
        };
        let Some(call) = from_native::<Call>(call.cast(), true) else {
            tracing::warn!("call_state_changed without a call on {:?}", core);
            return false;
        };
        let message = marshal::copy_string(message).unwrap_or_default();
        handler(core, &call, CallState::from_raw(state), &message);
        true
    });
}

unsafe extern "C" fn network_reachable_shim(core: *mut SipCore, reachable: bool_t) {
    deliver::<Core, _>("network_reachable", core.cast(), |core, listener| {
        let Some(handler) = listener.slots().network_reachable.get() else {
            return false;
        };
        handler(core, marshal::from_bool(reachable));
        true
    });
}

unsafe extern "C" fn call_state_changed_shim(call: *mut SipCall, state: c_int, message: *const c_char) {
    deliver::<Call, _>("state_changed", call.cast(), |call, listener| {
        let Some(handler) = listener.slots().state_changed.get() else {
            return false;
        };
        let message = marshal::copy_string(message).unwrap_or_default();
        handler(call, CallState::from_raw(state), &message);
        true
    });
}

unsafe extern "C" fn dtmf_received_shim(call: *mut SipCall, dtmf: c_int) {
    deliver::<Call, _>("dtmf_received", call.cast(), |call, listener| {
        let Some(handler) = listener.slots().dtmf_received.get() else {
            return false;
        };
        let Some(digit) = u32::try_from(dtmf).ok().and_then(char::from_u32) else {
            tracing::warn!("dropping untranslatable DTMF value {}", dtmf);
            return false;
        };
        handler(call, digit);
        true
    });
}
