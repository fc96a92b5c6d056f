//! `extern "C"` entry points of the fake engine

use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use sipbridge_sys::*;

use crate::list;
use crate::object::*;

pub(crate) const VERSION: &str = "5.3.0-fake";

static FACTORY: OnceLock<usize> = OnceLock::new();
static LOG_HANDLER: Mutex<Option<LogHandlerFn>> = Mutex::new(None);

thread_local! {
    static CALL_HOOK: Cell<Option<fn(&'static str)>> = const { Cell::new(None) };
}

/// Reports entry into `entry` to this thread's call hook, if any.
fn entered(entry: &'static str) {
    if let Some(hook) = CALL_HOOK.with(Cell::get) {
        hook(entry);
    }
}

pub(crate) fn set_call_hook(hook: Option<fn(&'static str)>) {
    CALL_HOOK.with(|slot| slot.set(hook));
}

pub(crate) unsafe fn with_core<R>(core: *const SipCore, f: impl FnOnce(&mut CoreBody) -> R) -> R {
    let object = FakeObject::typed(core, Kind::Core);
    let mut body = object.body.lock();
    match &mut *body {
        Body::Core(core) => f(core),
        _ => unreachable!("kind checked above"),
    }
}

pub(crate) unsafe fn with_call<R>(call: *const SipCall, f: impl FnOnce(&mut CallBody) -> R) -> R {
    let object = FakeObject::typed(call, Kind::Call);
    let mut body = object.body.lock();
    match &mut *body {
        Body::Call(call) => f(call),
        _ => unreachable!("kind checked above"),
    }
}

pub(crate) unsafe fn with_address<R>(addr: *const SipAddress, f: impl FnOnce(&mut AddressBody) -> R) -> R {
    let object = FakeObject::typed(addr, Kind::Address);
    let mut body = object.body.lock();
    match &mut *body {
        Body::Address(address) => f(address),
        _ => unreachable!("kind checked above"),
    }
}

unsafe fn with_core_cbs<R>(cbs: *const SipCoreCbs, f: impl FnOnce(&mut CoreCbsBody) -> R) -> R {
    let object = FakeObject::typed(cbs, Kind::CoreCbs);
    let mut body = object.body.lock();
    match &mut *body {
        Body::CoreCbs(cbs) => f(cbs),
        _ => unreachable!("kind checked above"),
    }
}

unsafe fn with_call_cbs<R>(cbs: *const SipCallCbs, f: impl FnOnce(&mut CallCbsBody) -> R) -> R {
    let object = FakeObject::typed(cbs, Kind::CallCbs);
    let mut body = object.body.lock();
    match &mut *body {
        Body::CallCbs(cbs) => f(cbs),
        _ => unreachable!("kind checked above"),
    }
}

fn c_string(value: &str) -> CString {
    CString::new(value.replace('\0', "")).unwrap_or_default()
}

fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |value| value.as_ptr())
}

/// Parses `sip:user@domain` / `sips:user@domain`.
pub(crate) fn parse_address(uri: &str) -> Option<AddressBody> {
    let (secure, rest) = if let Some(rest) = uri.strip_prefix("sips:") {
        (1, rest)
    } else if let Some(rest) = uri.strip_prefix("sip:") {
        (0, rest)
    } else {
        return None;
    };
    let (username, domain) = match rest.split_once('@') {
        Some((user, domain)) => (Some(user), domain),
        None => (None, rest),
    };
    if domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(AddressBody {
        username: username.filter(|user| !user.is_empty()).map(c_string),
        domain: c_string(domain),
        display_name: None,
        secure,
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Invokes `f` once per callback set attached to `core`, with the core's
/// current-callbacks accessor pointing at that set for the duration.
pub(crate) unsafe fn each_core_cbs(core: *mut SipCore, mut f: impl FnMut(CoreCbsBody)) {
    let snapshot = with_core(core, |body| body.callbacks.clone());
    for cbs in &snapshot {
        FakeObject::from_ptr(cbs.cast::<c_void>()).retain();
    }
    for cbs in &snapshot {
        let previous = with_core(core, |body| std::mem::replace(&mut body.current_cbs, *cbs));
        let table = with_core_cbs(cbs.cast::<SipCoreCbs>(), |table| *table);
        f(table);
        with_core(core, |body| body.current_cbs = previous);
    }
    for cbs in snapshot {
        FakeObject::release(cbs);
    }
}

pub(crate) unsafe fn each_call_cbs(call: *mut SipCall, mut f: impl FnMut(CallCbsBody)) {
    let snapshot = with_call(call, |body| body.callbacks.clone());
    for cbs in &snapshot {
        FakeObject::from_ptr(cbs.cast::<c_void>()).retain();
    }
    for cbs in &snapshot {
        let previous = with_call(call, |body| std::mem::replace(&mut body.current_cbs, *cbs));
        let table = with_call_cbs(cbs.cast::<SipCallCbs>(), |table| *table);
        f(table);
        with_call(call, |body| body.current_cbs = previous);
    }
    for cbs in snapshot {
        FakeObject::release(cbs);
    }
}

pub(crate) unsafe fn notify_global_state(core: *mut SipCore, state: c_int, message: &str) {
    let message = c_string(message);
    each_core_cbs(core, |table| {
        if let Some(cb) = table.global_state_changed {
            cb(core, state, message.as_ptr());
        }
    });
}

pub(crate) unsafe fn notify_network_reachable(core: *mut SipCore, reachable: bool_t) {
    with_core(core, |body| body.network_reachable = reachable);
    each_core_cbs(core, |table| {
        if let Some(cb) = table.network_reachable {
            cb(core, reachable);
        }
    });
}

/// Moves `call` to `state` and notifies the call's own callback sets, then
/// the owning core's.
pub(crate) unsafe fn notify_call_state(call: *mut SipCall, state: c_int, message: &str) {
    let message = c_string(message);
    let core = with_call(call, |body| {
        body.state = state;
        body.core.cast::<SipCore>()
    });
    each_call_cbs(call, |table| {
        if let Some(cb) = table.state_changed {
            cb(call, state, message.as_ptr());
        }
    });
    if !core.is_null() && !FakeObject::from_ptr(core.cast::<c_void>()).is_destroyed() {
        each_core_cbs(core, |table| {
            if let Some(cb) = table.call_state_changed {
                cb(core, call, state, message.as_ptr());
            }
        });
    }
}

pub(crate) unsafe fn notify_dtmf(call: *mut SipCall, dtmf: c_int) {
    each_call_cbs(call, |table| {
        if let Some(cb) = table.dtmf_received {
            cb(call, dtmf);
        }
    });
}

pub(crate) unsafe fn add_call(core: *mut SipCore, remote: *mut FakeObject, state: c_int) -> *mut SipCall {
    let call = FakeObject::alloc(Body::Call(CallBody::new(core.cast(), remote, state)));
    with_core(core, |body| {
        body.calls.push(call);
        let items: Vec<*mut c_void> = body.calls.iter().map(|call| call.cast()).collect();
        body.calls_list.rebuild(items);
    });
    call.cast()
}

pub(crate) fn emit_log(domain: &str, level: c_int, message: &str) {
    let handler = *LOG_HANDLER.lock();
    if let Some(handler) = handler {
        let domain = c_string(domain);
        let message = c_string(message);
        // SAFETY: both strings outlive the call.
        unsafe { handler(domain.as_ptr(), level, message.as_ptr()) };
    }
}

pub(crate) fn log_handler_installed() -> bool {
    LOG_HANDLER.lock().is_some()
}

// ---------------------------------------------------------------------------
// Object base
// ---------------------------------------------------------------------------

unsafe extern "C" fn object_ref(obj: *mut c_void) -> *mut c_void {
    entered("object_ref");
    FakeObject::from_ptr(obj).retain();
    obj
}

unsafe extern "C" fn object_unref(obj: *mut c_void) {
    entered("object_unref");
    FakeObject::release(obj.cast());
}

unsafe extern "C" fn object_data_get(obj: *const c_void, key: *const c_char) -> *mut c_void {
    FakeObject::from_ptr(obj).data_get(CStr::from_ptr(key))
}

unsafe extern "C" fn object_data_set(
    obj: *mut c_void,
    key: *const c_char,
    data: *mut c_void,
    destroy: Option<DataDestroyFn>,
) -> c_int {
    entered("object_data_set");
    FakeObject::from_ptr(obj).data_set(CStr::from_ptr(key), data, destroy)
}

unsafe extern "C" fn object_data_remove(obj: *mut c_void, key: *const c_char) -> c_int {
    entered("object_data_remove");
    FakeObject::from_ptr(obj).data_remove(CStr::from_ptr(key))
}

unsafe extern "C" fn logging_set_handler(handler: Option<LogHandlerFn>) {
    *LOG_HANDLER.lock() = handler;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

unsafe extern "C" fn factory_get() -> *mut SipFactory {
    *FACTORY.get_or_init(|| FakeObject::alloc(Body::Factory) as usize) as *mut SipFactory
}

unsafe extern "C" fn factory_create_core(factory: *mut SipFactory, config_path: *const c_char) -> *mut SipCore {
    entered("factory_create_core");
    FakeObject::typed(factory, Kind::Factory);
    let config_path = (!config_path.is_null()).then(|| CStr::from_ptr(config_path).to_string_lossy().into_owned());
    FakeObject::alloc(Body::Core(CoreBody::new(c_string(VERSION), config_path))).cast()
}

unsafe extern "C" fn factory_create_address(factory: *mut SipFactory, uri: *const c_char) -> *mut SipAddress {
    entered("factory_create_address");
    FakeObject::typed(factory, Kind::Factory);
    if uri.is_null() {
        return ptr::null_mut();
    }
    match parse_address(&CStr::from_ptr(uri).to_string_lossy()) {
        Some(body) => FakeObject::alloc(Body::Address(body)).cast(),
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn factory_create_core_cbs(factory: *mut SipFactory) -> *mut SipCoreCbs {
    entered("factory_create_core_cbs");
    FakeObject::typed(factory, Kind::Factory);
    FakeObject::alloc(Body::CoreCbs(CoreCbsBody::default())).cast()
}

unsafe extern "C" fn factory_create_call_cbs(factory: *mut SipFactory) -> *mut SipCallCbs {
    entered("factory_create_call_cbs");
    FakeObject::typed(factory, Kind::Factory);
    FakeObject::alloc(Body::CallCbs(CallCbsBody::default())).cast()
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

unsafe extern "C" fn core_get_version(core: *const SipCore) -> *const c_char {
    with_core(core, |body| body.version.as_ptr())
}

unsafe extern "C" fn core_start(core: *mut SipCore) -> c_int {
    let already_started = with_core(core, |body| std::mem::replace(&mut body.started, true));
    if already_started {
        return -1;
    }
    notify_global_state(core, SIPUA_GLOBAL_ON, "Ready");
    0
}

unsafe extern "C" fn core_stop(core: *mut SipCore) {
    let was_started = with_core(core, |body| std::mem::replace(&mut body.started, false));
    if was_started {
        notify_global_state(core, SIPUA_GLOBAL_OFF, "Off");
    }
}

unsafe extern "C" fn core_iterate(core: *mut SipCore) {
    with_core(core, |body| body.iterations += 1);
}

unsafe extern "C" fn core_invite_address(core: *mut SipCore, addr: *const SipAddress) -> *mut SipCall {
    if addr.is_null() {
        return ptr::null_mut();
    }
    let remote = FakeObject::typed(addr, Kind::Address);
    remote.retain();
    let call = add_call(core, addr as *mut FakeObject, SIPUA_CALL_OUTGOING_INIT);
    notify_call_state(call, SIPUA_CALL_OUTGOING_INIT, "Starting outgoing call");
    call
}

unsafe extern "C" fn core_get_calls(core: *const SipCore) -> *const SipList {
    with_core(core, |body| body.calls_list.0.cast_const())
}

unsafe extern "C" fn core_get_current_call(core: *const SipCore) -> *mut SipCall {
    let calls = with_core(core, |body| body.calls.clone());
    calls
        .into_iter()
        .rev()
        .find(|call| {
            let state = with_call(call.cast::<SipCall>(), |body| body.state);
            !matches!(state, SIPUA_CALL_END | SIPUA_CALL_ERROR | SIPUA_CALL_RELEASED)
        })
        .map_or(ptr::null_mut(), |call| call.cast())
}

unsafe extern "C" fn core_terminate_all_calls(core: *mut SipCore) -> c_int {
    let calls = with_core(core, |body| body.calls.clone());
    for call in &calls {
        let state = with_call(call.cast::<SipCall>(), |body| body.state);
        if !matches!(state, SIPUA_CALL_END | SIPUA_CALL_RELEASED) {
            notify_call_state(call.cast(), SIPUA_CALL_END, "Call terminated");
        }
    }
    let released = with_core(core, |body| {
        body.calls_list.clear();
        std::mem::take(&mut body.calls)
    });
    for call in released {
        notify_call_state(call.cast(), SIPUA_CALL_RELEASED, "Call released");
        FakeObject::release(call);
    }
    0
}

unsafe extern "C" fn core_mic_enabled(core: *const SipCore) -> bool_t {
    with_core(core, |body| body.mic)
}

unsafe extern "C" fn core_enable_mic(core: *mut SipCore, enable: bool_t) {
    with_core(core, |body| body.mic = enable);
}

unsafe extern "C" fn core_is_network_reachable(core: *const SipCore) -> bool_t {
    with_core(core, |body| body.network_reachable)
}

unsafe extern "C" fn core_get_supported_tags(core: *const SipCore) -> *const SipList {
    with_core(core, |body| body.tags_list.0.cast_const())
}

unsafe extern "C" fn core_set_supported_tags(core: *mut SipCore, tags: *const SipList) -> c_int {
    // Copy the caller's buffers; they are only valid for the duration of the call.
    let mut copied = Vec::new();
    let mut cell = tags;
    while !cell.is_null() {
        let data = (*cell).data;
        if data.is_null() {
            return -1;
        }
        copied.push(CStr::from_ptr(data.cast::<c_char>()).to_owned());
        cell = (*cell).next;
    }
    with_core(core, |body| {
        body.tags = copied;
        let items: Vec<*mut c_void> = body.tags.iter().map(|tag| tag.as_ptr() as *mut c_void).collect();
        body.tags_list.rebuild(items);
    });
    0
}

unsafe extern "C" fn core_add_callbacks(core: *mut SipCore, cbs: *mut SipCoreCbs) {
    entered("core_add_callbacks");
    FakeObject::typed(cbs, Kind::CoreCbs).retain();
    with_core(core, |body| body.callbacks.push(cbs.cast()));
}

unsafe extern "C" fn core_remove_callbacks(core: *mut SipCore, cbs: *mut SipCoreCbs) {
    entered("core_remove_callbacks");
    let removed = with_core(core, |body| {
        let index = body.callbacks.iter().position(|attached| *attached == cbs.cast::<FakeObject>())?;
        Some(body.callbacks.remove(index))
    });
    if let Some(cbs) = removed {
        FakeObject::release(cbs);
    }
}

unsafe extern "C" fn core_get_current_callbacks(core: *const SipCore) -> *mut SipCoreCbs {
    entered("core_get_current_callbacks");
    with_core(core, |body| body.current_cbs.cast())
}

unsafe extern "C" fn core_cbs_set_global_state_changed(cbs: *mut SipCoreCbs, cb: Option<CoreGlobalStateChangedFn>) {
    with_core_cbs(cbs, |table| table.global_state_changed = cb);
}

unsafe extern "C" fn core_cbs_set_call_state_changed(cbs: *mut SipCoreCbs, cb: Option<CoreCallStateChangedFn>) {
    with_core_cbs(cbs, |table| table.call_state_changed = cb);
}

unsafe extern "C" fn core_cbs_set_network_reachable(cbs: *mut SipCoreCbs, cb: Option<CoreNetworkReachableFn>) {
    with_core_cbs(cbs, |table| table.network_reachable = cb);
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

unsafe extern "C" fn call_get_core(call: *const SipCall) -> *mut SipCore {
    with_call(call, |body| body.core.cast())
}

unsafe extern "C" fn call_get_remote_address(call: *const SipCall) -> *const SipAddress {
    with_call(call, |body| body.remote.cast_const().cast())
}

unsafe extern "C" fn call_get_state(call: *const SipCall) -> c_int {
    with_call(call, |body| body.state)
}

unsafe extern "C" fn call_accept(call: *mut SipCall) -> c_int {
    if with_call(call, |body| body.state) != SIPUA_CALL_INCOMING_RECEIVED {
        return -1;
    }
    notify_call_state(call, SIPUA_CALL_CONNECTED, "Connected");
    notify_call_state(call, SIPUA_CALL_STREAMS_RUNNING, "Streams running");
    0
}

unsafe extern "C" fn call_terminate(call: *mut SipCall) -> c_int {
    let state = with_call(call, |body| body.state);
    if matches!(state, SIPUA_CALL_END | SIPUA_CALL_RELEASED) {
        return -1;
    }
    notify_call_state(call, SIPUA_CALL_END, "Call terminated");
    0
}

unsafe extern "C" fn call_is_recording(call: *const SipCall) -> bool_t {
    with_call(call, |body| body.recording)
}

unsafe extern "C" fn call_send_dtmf(call: *mut SipCall, dtmf: c_char) -> c_int {
    with_call(call, |body| {
        if !matches!(body.state, SIPUA_CALL_CONNECTED | SIPUA_CALL_STREAMS_RUNNING) {
            return -2;
        }
        body.dtmfs.push(dtmf as u8 as char);
        0
    })
}

unsafe extern "C" fn call_add_callbacks(call: *mut SipCall, cbs: *mut SipCallCbs) {
    entered("call_add_callbacks");
    FakeObject::typed(cbs, Kind::CallCbs).retain();
    with_call(call, |body| body.callbacks.push(cbs.cast()));
}

unsafe extern "C" fn call_remove_callbacks(call: *mut SipCall, cbs: *mut SipCallCbs) {
    entered("call_remove_callbacks");
    let removed = with_call(call, |body| {
        let index = body.callbacks.iter().position(|attached| *attached == cbs.cast::<FakeObject>())?;
        Some(body.callbacks.remove(index))
    });
    if let Some(cbs) = removed {
        FakeObject::release(cbs);
    }
}

unsafe extern "C" fn call_get_current_callbacks(call: *const SipCall) -> *mut SipCallCbs {
    entered("call_get_current_callbacks");
    with_call(call, |body| body.current_cbs.cast())
}

unsafe extern "C" fn call_cbs_set_state_changed(cbs: *mut SipCallCbs, cb: Option<CallStateChangedFn>) {
    with_call_cbs(cbs, |table| table.state_changed = cb);
}

unsafe extern "C" fn call_cbs_set_dtmf_received(cbs: *mut SipCallCbs, cb: Option<CallDtmfReceivedFn>) {
    with_call_cbs(cbs, |table| table.dtmf_received = cb);
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

unsafe extern "C" fn address_get_username(addr: *const SipAddress) -> *const c_char {
    with_address(addr, |body| opt_ptr(&body.username))
}

unsafe extern "C" fn address_get_domain(addr: *const SipAddress) -> *const c_char {
    with_address(addr, |body| body.domain.as_ptr())
}

unsafe extern "C" fn address_get_display_name(addr: *const SipAddress) -> *const c_char {
    with_address(addr, |body| opt_ptr(&body.display_name))
}

unsafe extern "C" fn address_set_display_name(addr: *mut SipAddress, name: *const c_char) -> c_int {
    let name = (!name.is_null()).then(|| CStr::from_ptr(name).to_owned());
    with_address(addr, |body| body.display_name = name);
    0
}

unsafe extern "C" fn address_is_secure(addr: *const SipAddress) -> bool_t {
    with_address(addr, |body| body.secure)
}

unsafe extern "C" fn address_weak_equal(a: *const SipAddress, b: *const SipAddress) -> bool_t {
    let left = with_address(a, |body| (body.username.clone(), body.domain.clone()));
    let right = with_address(b, |body| (body.username.clone(), body.domain.clone()));
    bool_t::from(left == right)
}

/// Entry-point table backed by the fake engine.
pub static FAKE_API: EngineApi = EngineApi {
    object_ref,
    object_unref,
    object_data_get,
    object_data_set,
    object_data_remove,
    list_next: list::list_next,
    list_get_data: list::list_get_data,
    list_append: list::list_append,
    list_free: list::list_free,
    logging_set_handler,
    factory_get,
    factory_create_core,
    factory_create_address,
    factory_create_core_cbs,
    factory_create_call_cbs,
    core_get_version,
    core_start,
    core_stop,
    core_iterate,
    core_invite_address,
    core_get_calls,
    core_get_current_call,
    core_terminate_all_calls,
    core_mic_enabled,
    core_enable_mic,
    core_is_network_reachable,
    core_get_supported_tags,
    core_set_supported_tags,
    core_add_callbacks,
    core_remove_callbacks,
    core_get_current_callbacks,
    core_cbs_set_global_state_changed,
    core_cbs_set_call_state_changed,
    core_cbs_set_network_reachable,
    call_get_core,
    call_get_remote_address,
    call_get_state,
    call_accept,
    call_terminate,
    call_is_recording,
    call_send_dtmf,
    call_add_callbacks,
    call_remove_callbacks,
    call_get_current_callbacks,
    call_cbs_set_state_changed,
    call_cbs_set_dtmf_received,
    address_get_username,
    address_get_domain,
    address_get_display_name,
    address_set_display_name,
    address_is_secure,
    address_weak_equal,
};
