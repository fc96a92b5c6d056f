//! In-process fake of the sipua engine
//!
//! [`FAKE_API`] implements every entry of [`EngineApi`] on top of plain Rust
//! objects with real reference counts, a keyed user-data side table with
//! destroy callbacks, and cons-cell lists. Tests drive the engine from the
//! "native" side through the `fire_*` helpers and inspect its state through
//! the accessors below.
//!
//! Objects are never freed, so pointers stay valid for inspection after the
//! engine destroyed them.

mod engine;
pub mod list;
mod object;

use std::ffi::CStr;

use sipbridge_sys::*;

pub use engine::FAKE_API;

use engine::{with_address, with_call, with_core};
use object::{FakeObject, Kind};

/// The fake engine's entry-point table.
pub fn api() -> &'static EngineApi {
    &FAKE_API
}

/// Raw pointer that can be moved to another thread.
///
/// Fake objects are internally synchronized, so sharing their addresses
/// across threads is sound.
#[derive(Debug)]
pub struct SendPtr<T>(pub *mut T);

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPtr<T> {}

unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    pub fn get(self) -> *mut T {
        self.0
    }
}

fn fake<'a, T>(obj: *const T) -> &'a FakeObject {
    // SAFETY: every pointer handed to tests originates from FakeObject::alloc
    // and is never freed.
    unsafe { FakeObject::from_ptr(obj.cast::<c_void>()) }
}

/// Current reference count of any fake object.
pub fn refcount<T>(obj: *const T) -> usize {
    fake(obj).refcount()
}

/// Whether the object's refcount reached zero.
pub fn is_destroyed<T>(obj: *const T) -> bool {
    fake(obj).is_destroyed()
}

/// Number of user-data entries currently attached to the object.
pub fn data_entries<T>(obj: *const T) -> usize {
    fake(obj).data_len()
}

/// Raw user-data lookup, bypassing the bridge.
pub fn data_get<T>(obj: *const T, key: &CStr) -> *mut c_void {
    fake(obj).data_get(key)
}

/// Removes a user-data entry, running its destroy callback.
pub fn data_remove<T>(obj: *const T, key: &CStr) -> c_int {
    // SAFETY: destroy callbacks installed through the engine stay valid.
    unsafe { fake(obj).data_remove(key) }
}

/// Takes a native reference the way engine-internal code would.
pub fn retain<T>(obj: *const T) {
    fake(obj).retain();
}

/// Drops a native reference the way engine-internal code would.
///
/// # Safety
///
/// The caller must own the reference being dropped.
pub unsafe fn release<T>(obj: *mut T) {
    FakeObject::release(obj.cast::<FakeObject>());
}

fn assert_kind<T>(obj: *const T, kind: Kind) {
    assert_eq!(fake(obj).kind(), kind, "unexpected fake object kind");
}

/// Creates a core the way the factory does, returning the creator's reference.
pub fn new_core() -> *mut SipCore {
    // SAFETY: fake entry points accept any pointer they produced.
    unsafe { (FAKE_API.factory_create_core)((FAKE_API.factory_get)(), std::ptr::null()) }
}

/// Creates an address from a URI, returning the creator's reference.
pub fn new_address(uri: &str) -> *mut SipAddress {
    let uri = std::ffi::CString::new(uri).expect("uri without NUL");
    // SAFETY: as above.
    unsafe { (FAKE_API.factory_create_address)((FAKE_API.factory_get)(), uri.as_ptr()) }
}

pub fn core_callbacks(core: *const SipCore) -> usize {
    // SAFETY: fake pointer.
    unsafe { with_core(core, |body| body.callbacks.len()) }
}

pub fn call_callbacks(call: *const SipCall) -> usize {
    // SAFETY: fake pointer.
    unsafe { with_call(call, |body| body.callbacks.len()) }
}

pub fn core_calls(core: *const SipCore) -> Vec<*mut SipCall> {
    // SAFETY: fake pointer.
    unsafe { with_core(core, |body| body.calls.iter().map(|call| call.cast()).collect()) }
}

/// Raw microphone byte, to check how the bridge encodes booleans.
pub fn mic_byte(core: *const SipCore) -> bool_t {
    // SAFETY: fake pointer.
    unsafe { with_core(core, |body| body.mic) }
}

/// Stores an arbitrary non-zero or zero byte as the microphone flag.
pub fn set_mic_byte(core: *mut SipCore, value: bool_t) {
    // SAFETY: fake pointer.
    unsafe { with_core(core, |body| body.mic = value) }
}

pub fn set_recording_byte(call: *mut SipCall, value: bool_t) {
    // SAFETY: fake pointer.
    unsafe { with_call(call, |body| body.recording = value) }
}

pub fn set_address_secure_byte(addr: *mut SipAddress, value: bool_t) {
    // SAFETY: fake pointer.
    unsafe { with_address(addr, |body| body.secure = value) }
}

/// DTMF digits sent on the call so far.
pub fn sent_dtmfs(call: *const SipCall) -> String {
    // SAFETY: fake pointer.
    unsafe { with_call(call, |body| body.dtmfs.clone()) }
}

pub fn iterate_count(core: *const SipCore) -> usize {
    // SAFETY: fake pointer.
    unsafe { with_core(core, |body| body.iterations) }
}

pub fn config_path(core: *const SipCore) -> Option<String> {
    // SAFETY: fake pointer.
    unsafe { with_core(core, |body| body.config_path.clone()) }
}

/// Supported tags as stored on the engine side.
pub fn stored_tags(core: *const SipCore) -> Vec<String> {
    // SAFETY: fake pointer.
    unsafe {
        with_core(core, |body| {
            body.tags
                .iter()
                .map(|tag| tag.to_string_lossy().into_owned())
                .collect()
        })
    }
}

/// Delivers `global_state_changed` to every callback set on `core`.
pub fn fire_global_state_changed(core: *mut SipCore, state: c_int, message: &str) {
    assert_kind(core, Kind::Core);
    // SAFETY: fake pointer.
    unsafe { engine::notify_global_state(core, state, message) }
}

/// Moves a call to `state`, notifying its own callbacks and then its core's.
pub fn fire_call_state_changed(call: *mut SipCall, state: c_int, message: &str) {
    assert_kind(call, Kind::Call);
    // SAFETY: fake pointer.
    unsafe { engine::notify_call_state(call, state, message) }
}

/// Delivers `network_reachable` with a raw byte, so tests can pass values
/// other than 0 and 1.
pub fn fire_network_reachable(core: *mut SipCore, reachable: bool_t) {
    assert_kind(core, Kind::Core);
    // SAFETY: fake pointer.
    unsafe { engine::notify_network_reachable(core, reachable) }
}

pub fn fire_dtmf_received(call: *mut SipCall, dtmf: char) {
    assert_kind(call, Kind::Call);
    // SAFETY: fake pointer.
    unsafe { engine::notify_dtmf(call, dtmf as c_int) }
}

/// Simulates an incoming INVITE from `from` and returns the new call.
///
/// The call is owned by the core; no reference is handed to the caller.
pub fn incoming_call(core: *mut SipCore, from: &str) -> *mut SipCall {
    assert_kind(core, Kind::Core);
    let remote = engine::parse_address(from).expect("valid sip uri");
    let remote = FakeObject::alloc(object::Body::Address(remote));
    // SAFETY: fake pointers.
    unsafe {
        let call = engine::add_call(core, remote, SIPUA_CALL_INCOMING_RECEIVED);
        engine::notify_call_state(call, SIPUA_CALL_INCOMING_RECEIVED, "Incoming call");
        call
    }
}

/// Sends a line through whatever log handler is installed.
pub fn emit_log(domain: &str, level: c_int, message: &str) {
    engine::emit_log(domain, level, message)
}

pub fn log_handler_installed() -> bool {
    engine::log_handler_installed()
}

/// Installs a hook run at the start of the entry points that take engine
/// locks (refcounting, side table, factory creation, callback sets), on
/// the calling thread only. `None` removes it.
pub fn set_call_hook(hook: Option<fn(&'static str)>) {
    engine::set_call_hook(hook)
}

/// Version string every fake core reports.
pub fn version() -> &'static str {
    engine::VERSION
}
