//! Raw C ABI of the sipua engine
//!
//! Everything in this crate mirrors the native headers one-to-one. The safe
//! bridge in `sipbridge` never calls these symbols by name; it goes through an
//! [`EngineApi`] table installed once per process, which lets tests swap in an
//! in-process engine and keeps library loading out of the bridge.
//!
//! # Native object contract
//!
//! - Every object type below is a reference-counted native object that
//!   starts life with a refcount of one owned by whoever created it.
//! - `object_data_set` replaces an existing entry under the same key and runs
//!   the replaced entry's destroy callback. `object_data_remove` runs the
//!   removed entry's destroy callback. Destroying an object runs the destroy
//!   callback of every entry still present.
//! - Strings returned by the engine are borrowed; the caller copies them and
//!   never frees them.
//! - Booleans are a single byte, zero meaning false.

#![allow(non_camel_case_types)]

pub use libc::{c_char, c_int, c_uchar, c_void};

/// Native boolean: one byte, zero is false.
pub type bool_t = c_uchar;

macro_rules! opaque {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque! {
    /// Process-wide factory singleton.
    SipFactory;
    /// Engine instance owning calls, accounts and the main loop.
    SipCore;
    /// One call leg.
    SipCall;
    /// Parsed SIP address.
    SipAddress;
    /// Callback set attached to a core.
    SipCoreCbs;
    /// Callback set attached to a call.
    SipCallCbs;
}

/// Singly-linked cons cell used to pass collections across the boundary.
///
/// An empty list is a null head pointer. The bridge only touches cells via
/// the `list_*` entry points of [`EngineApi`].
#[repr(C)]
pub struct SipList {
    pub next: *mut SipList,
    pub data: *mut c_void,
}

/// Destroy callback stored alongside a side-table entry.
pub type DataDestroyFn = unsafe extern "C" fn(data: *mut c_void);

/// Native log sink: `(domain, level, message)`.
pub type LogHandlerFn = unsafe extern "C" fn(domain: *const c_char, level: c_int, message: *const c_char);

pub type CoreGlobalStateChangedFn = unsafe extern "C" fn(core: *mut SipCore, state: c_int, message: *const c_char);
pub type CoreCallStateChangedFn =
    unsafe extern "C" fn(core: *mut SipCore, call: *mut SipCall, state: c_int, message: *const c_char);
pub type CoreNetworkReachableFn = unsafe extern "C" fn(core: *mut SipCore, reachable: bool_t);
pub type CallStateChangedFn = unsafe extern "C" fn(call: *mut SipCall, state: c_int, message: *const c_char);
pub type CallDtmfReceivedFn = unsafe extern "C" fn(call: *mut SipCall, dtmf: c_int);

/// Native log levels as passed to [`LogHandlerFn`].
pub const SIPUA_LOG_DEBUG: c_int = 1;
pub const SIPUA_LOG_TRACE: c_int = 1 << 1;
pub const SIPUA_LOG_MESSAGE: c_int = 1 << 2;
pub const SIPUA_LOG_WARNING: c_int = 1 << 3;
pub const SIPUA_LOG_ERROR: c_int = 1 << 4;
pub const SIPUA_LOG_FATAL: c_int = 1 << 5;

pub const SIPUA_GLOBAL_OFF: c_int = 0;
pub const SIPUA_GLOBAL_STARTUP: c_int = 1;
pub const SIPUA_GLOBAL_ON: c_int = 2;
pub const SIPUA_GLOBAL_SHUTDOWN: c_int = 3;
pub const SIPUA_GLOBAL_CONFIGURING: c_int = 4;

pub const SIPUA_CALL_IDLE: c_int = 0;
pub const SIPUA_CALL_INCOMING_RECEIVED: c_int = 1;
pub const SIPUA_CALL_OUTGOING_INIT: c_int = 2;
pub const SIPUA_CALL_OUTGOING_PROGRESS: c_int = 3;
pub const SIPUA_CALL_OUTGOING_RINGING: c_int = 4;
pub const SIPUA_CALL_CONNECTED: c_int = 5;
pub const SIPUA_CALL_STREAMS_RUNNING: c_int = 6;
pub const SIPUA_CALL_PAUSED: c_int = 7;
pub const SIPUA_CALL_END: c_int = 8;
pub const SIPUA_CALL_ERROR: c_int = 9;
pub const SIPUA_CALL_RELEASED: c_int = 10;

/// Table of every native entry point the bridge uses.
///
/// Object-generic entry points take `*mut c_void` the same way the native
/// headers do; typed entry points take the opaque types above.
#[derive(Clone, Copy)]
pub struct EngineApi {
    // Object base
    pub object_ref: unsafe extern "C" fn(obj: *mut c_void) -> *mut c_void,
    pub object_unref: unsafe extern "C" fn(obj: *mut c_void),
    pub object_data_get: unsafe extern "C" fn(obj: *const c_void, key: *const c_char) -> *mut c_void,
    pub object_data_set: unsafe extern "C" fn(
        obj: *mut c_void,
        key: *const c_char,
        data: *mut c_void,
        destroy: Option<DataDestroyFn>,
    ) -> c_int,
    pub object_data_remove: unsafe extern "C" fn(obj: *mut c_void, key: *const c_char) -> c_int,

    // Lists
    pub list_next: unsafe extern "C" fn(node: *const SipList) -> *mut SipList,
    pub list_get_data: unsafe extern "C" fn(node: *const SipList) -> *mut c_void,
    pub list_append: unsafe extern "C" fn(list: *mut SipList, data: *mut c_void) -> *mut SipList,
    pub list_free: unsafe extern "C" fn(list: *mut SipList),

    // Logging
    pub logging_set_handler: unsafe extern "C" fn(handler: Option<LogHandlerFn>),

    // Factory
    pub factory_get: unsafe extern "C" fn() -> *mut SipFactory,
    pub factory_create_core: unsafe extern "C" fn(factory: *mut SipFactory, config_path: *const c_char) -> *mut SipCore,
    pub factory_create_address: unsafe extern "C" fn(factory: *mut SipFactory, uri: *const c_char) -> *mut SipAddress,
    pub factory_create_core_cbs: unsafe extern "C" fn(factory: *mut SipFactory) -> *mut SipCoreCbs,
    pub factory_create_call_cbs: unsafe extern "C" fn(factory: *mut SipFactory) -> *mut SipCallCbs,

    // Core
    pub core_get_version: unsafe extern "C" fn(core: *const SipCore) -> *const c_char,
    pub core_start: unsafe extern "C" fn(core: *mut SipCore) -> c_int,
    pub core_stop: unsafe extern "C" fn(core: *mut SipCore),
    pub core_iterate: unsafe extern "C" fn(core: *mut SipCore),
    pub core_invite_address: unsafe extern "C" fn(core: *mut SipCore, addr: *const SipAddress) -> *mut SipCall,
    pub core_get_calls: unsafe extern "C" fn(core: *const SipCore) -> *const SipList,
    pub core_get_current_call: unsafe extern "C" fn(core: *const SipCore) -> *mut SipCall,
    pub core_terminate_all_calls: unsafe extern "C" fn(core: *mut SipCore) -> c_int,
    pub core_mic_enabled: unsafe extern "C" fn(core: *const SipCore) -> bool_t,
    pub core_enable_mic: unsafe extern "C" fn(core: *mut SipCore, enable: bool_t),
    pub core_is_network_reachable: unsafe extern "C" fn(core: *const SipCore) -> bool_t,
    pub core_get_supported_tags: unsafe extern "C" fn(core: *const SipCore) -> *const SipList,
    pub core_set_supported_tags: unsafe extern "C" fn(core: *mut SipCore, tags: *const SipList) -> c_int,
    pub core_add_callbacks: unsafe extern "C" fn(core: *mut SipCore, cbs: *mut SipCoreCbs),
    pub core_remove_callbacks: unsafe extern "C" fn(core: *mut SipCore, cbs: *mut SipCoreCbs),
    pub core_get_current_callbacks: unsafe extern "C" fn(core: *const SipCore) -> *mut SipCoreCbs,

    // Core callbacks
    pub core_cbs_set_global_state_changed:
        unsafe extern "C" fn(cbs: *mut SipCoreCbs, cb: Option<CoreGlobalStateChangedFn>),
    pub core_cbs_set_call_state_changed: unsafe extern "C" fn(cbs: *mut SipCoreCbs, cb: Option<CoreCallStateChangedFn>),
    pub core_cbs_set_network_reachable: unsafe extern "C" fn(cbs: *mut SipCoreCbs, cb: Option<CoreNetworkReachableFn>),

    // Call
    pub call_get_core: unsafe extern "C" fn(call: *const SipCall) -> *mut SipCore,
    pub call_get_remote_address: unsafe extern "C" fn(call: *const SipCall) -> *const SipAddress,
    pub call_get_state: unsafe extern "C" fn(call: *const SipCall) -> c_int,
    pub call_accept: unsafe extern "C" fn(call: *mut SipCall) -> c_int,
    pub call_terminate: unsafe extern "C" fn(call: *mut SipCall) -> c_int,
    pub call_is_recording: unsafe extern "C" fn(call: *const SipCall) -> bool_t,
    pub call_send_dtmf: unsafe extern "C" fn(call: *mut SipCall, dtmf: c_char) -> c_int,
    pub call_add_callbacks: unsafe extern "C" fn(call: *mut SipCall, cbs: *mut SipCallCbs),
    pub call_remove_callbacks: unsafe extern "C" fn(call: *mut SipCall, cbs: *mut SipCallCbs),
    pub call_get_current_callbacks: unsafe extern "C" fn(call: *const SipCall) -> *mut SipCallCbs,

    // Call callbacks
    pub call_cbs_set_state_changed: unsafe extern "C" fn(cbs: *mut SipCallCbs, cb: Option<CallStateChangedFn>),
    pub call_cbs_set_dtmf_received: unsafe extern "C" fn(cbs: *mut SipCallCbs, cb: Option<CallDtmfReceivedFn>),

    // Address
    pub address_get_username: unsafe extern "C" fn(addr: *const SipAddress) -> *const c_char,
    pub address_get_domain: unsafe extern "C" fn(addr: *const SipAddress) -> *const c_char,
    pub address_get_display_name: unsafe extern "C" fn(addr: *const SipAddress) -> *const c_char,
    pub address_set_display_name: unsafe extern "C" fn(addr: *mut SipAddress, name: *const c_char) -> c_int,
    pub address_is_secure: unsafe extern "C" fn(addr: *const SipAddress) -> bool_t,
    pub address_weak_equal: unsafe extern "C" fn(a: *const SipAddress, b: *const SipAddress) -> bool_t,
}

#[cfg(feature = "linked")]
mod linked;

#[cfg(feature = "linked")]
pub use linked::LINKED_API;
