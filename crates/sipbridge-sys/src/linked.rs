//! Entry points resolved by the linker against the native `sipua` library.

use crate::*;

#[link(name = "sipua")]
extern "C" {
    fn sipua_object_ref(obj: *mut c_void) -> *mut c_void;
    fn sipua_object_unref(obj: *mut c_void);
    fn sipua_object_data_get(obj: *const c_void, key: *const c_char) -> *mut c_void;
    fn sipua_object_data_set(
        obj: *mut c_void,
        key: *const c_char,
        data: *mut c_void,
        destroy: Option<DataDestroyFn>,
    ) -> c_int;
    fn sipua_object_data_remove(obj: *mut c_void, key: *const c_char) -> c_int;

    fn sipua_list_next(node: *const SipList) -> *mut SipList;
    fn sipua_list_get_data(node: *const SipList) -> *mut c_void;
    fn sipua_list_append(list: *mut SipList, data: *mut c_void) -> *mut SipList;
    fn sipua_list_free(list: *mut SipList);

    fn sipua_logging_set_handler(handler: Option<LogHandlerFn>);

    fn sipua_factory_get() -> *mut SipFactory;
    fn sipua_factory_create_core(factory: *mut SipFactory, config_path: *const c_char) -> *mut SipCore;
    fn sipua_factory_create_address(factory: *mut SipFactory, uri: *const c_char) -> *mut SipAddress;
    fn sipua_factory_create_core_cbs(factory: *mut SipFactory) -> *mut SipCoreCbs;
    fn sipua_factory_create_call_cbs(factory: *mut SipFactory) -> *mut SipCallCbs;

    fn sipua_core_get_version(core: *const SipCore) -> *const c_char;
    fn sipua_core_start(core: *mut SipCore) -> c_int;
    fn sipua_core_stop(core: *mut SipCore);
    fn sipua_core_iterate(core: *mut SipCore);
    fn sipua_core_invite_address(core: *mut SipCore, addr: *const SipAddress) -> *mut SipCall;
    fn sipua_core_get_calls(core: *const SipCore) -> *const SipList;
    fn sipua_core_get_current_call(core: *const SipCore) -> *mut SipCall;
    fn sipua_core_terminate_all_calls(core: *mut SipCore) -> c_int;
    fn sipua_core_mic_enabled(core: *const SipCore) -> bool_t;
    fn sipua_core_enable_mic(core: *mut SipCore, enable: bool_t);
    fn sipua_core_is_network_reachable(core: *const SipCore) -> bool_t;
    fn sipua_core_get_supported_tags(core: *const SipCore) -> *const SipList;
    fn sipua_core_set_supported_tags(core: *mut SipCore, tags: *const SipList) -> c_int;
    fn sipua_core_add_callbacks(core: *mut SipCore, cbs: *mut SipCoreCbs);
    fn sipua_core_remove_callbacks(core: *mut SipCore, cbs: *mut SipCoreCbs);
    fn sipua_core_get_current_callbacks(core: *const SipCore) -> *mut SipCoreCbs;

    fn sipua_core_cbs_set_global_state_changed(cbs: *mut SipCoreCbs, cb: Option<CoreGlobalStateChangedFn>);
    fn sipua_core_cbs_set_call_state_changed(cbs: *mut SipCoreCbs, cb: Option<CoreCallStateChangedFn>);
    fn sipua_core_cbs_set_network_reachable(cbs: *mut SipCoreCbs, cb: Option<CoreNetworkReachableFn>);

    fn sipua_call_get_core(call: *const SipCall) -> *mut SipCore;
    fn sipua_call_get_remote_address(call: *const SipCall) -> *const SipAddress;
    fn sipua_call_get_state(call: *const SipCall) -> c_int;
    fn sipua_call_accept(call: *mut SipCall) -> c_int;
    fn sipua_call_terminate(call: *mut SipCall) -> c_int;
    fn sipua_call_is_recording(call: *const SipCall) -> bool_t;
    fn sipua_call_send_dtmf(call: *mut SipCall, dtmf: c_char) -> c_int;
    fn sipua_call_add_callbacks(call: *mut SipCall, cbs: *mut SipCallCbs);
    fn sipua_call_remove_callbacks(call: *mut SipCall, cbs: *mut SipCallCbs);
    fn sipua_call_get_current_callbacks(call: *const SipCall) -> *mut SipCallCbs;

    fn sipua_call_cbs_set_state_changed(cbs: *mut SipCallCbs, cb: Option<CallStateChangedFn>);
    fn sipua_call_cbs_set_dtmf_received(cbs: *mut SipCallCbs, cb: Option<CallDtmfReceivedFn>);

    fn sipua_address_get_username(addr: *const SipAddress) -> *const c_char;
    fn sipua_address_get_domain(addr: *const SipAddress) -> *const c_char;
    fn sipua_address_get_display_name(addr: *const SipAddress) -> *const c_char;
    fn sipua_address_set_display_name(addr: *mut SipAddress, name: *const c_char) -> c_int;
    fn sipua_address_is_secure(addr: *const SipAddress) -> bool_t;
    fn sipua_address_weak_equal(a: *const SipAddress, b: *const SipAddress) -> bool_t;
}

/// Entry-point table backed by the linked native library.
pub static LINKED_API: EngineApi = EngineApi {
    object_ref: sipua_object_ref,
    object_unref: sipua_object_unref,
    object_data_get: sipua_object_data_get,
    object_data_set: sipua_object_data_set,
    object_data_remove: sipua_object_data_remove,
    list_next: sipua_list_next,
    list_get_data: sipua_list_get_data,
    list_append: sipua_list_append,
    list_free: sipua_list_free,
    logging_set_handler: sipua_logging_set_handler,
    factory_get: sipua_factory_get,
    factory_create_core: sipua_factory_create_core,
    factory_create_address: sipua_factory_create_address,
    factory_create_core_cbs: sipua_factory_create_core_cbs,
    factory_create_call_cbs: sipua_factory_create_call_cbs,
    core_get_version: sipua_core_get_version,
    core_start: sipua_core_start,
    core_stop: sipua_core_stop,
    core_iterate: sipua_core_iterate,
    core_invite_address: sipua_core_invite_address,
    core_get_calls: sipua_core_get_calls,
    core_get_current_call: sipua_core_get_current_call,
    core_terminate_all_calls: sipua_core_terminate_all_calls,
    core_mic_enabled: sipua_core_mic_enabled,
    core_enable_mic: sipua_core_enable_mic,
    core_is_network_reachable: sipua_core_is_network_reachable,
    core_get_supported_tags: sipua_core_get_supported_tags,
    core_set_supported_tags: sipua_core_set_supported_tags,
    core_add_callbacks: sipua_core_add_callbacks,
    core_remove_callbacks: sipua_core_remove_callbacks,
    core_get_current_callbacks: sipua_core_get_current_callbacks,
    core_cbs_set_global_state_changed: sipua_core_cbs_set_global_state_changed,
    core_cbs_set_call_state_changed: sipua_core_cbs_set_call_state_changed,
    core_cbs_set_network_reachable: sipua_core_cbs_set_network_reachable,
    call_get_core: sipua_call_get_core,
    call_get_remote_address: sipua_call_get_remote_address,
    call_get_state: sipua_call_get_state,
    call_accept: sipua_call_accept,
    call_terminate: sipua_call_terminate,
    call_is_recording: sipua_call_is_recording,
    call_send_dtmf: sipua_call_send_dtmf,
    call_add_callbacks: sipua_call_add_callbacks,
    call_remove_callbacks: sipua_call_remove_callbacks,
    call_get_current_callbacks: sipua_call_get_current_callbacks,
    call_cbs_set_state_changed: sipua_call_cbs_set_state_changed,
    call_cbs_set_dtmf_received: sipua_call_cbs_set_dtmf_received,
    address_get_username: sipua_address_get_username,
    address_get_domain: sipua_address_get_domain,
    address_get_display_name: sipua_address_get_display_name,
    address_set_display_name: sipua_address_set_display_name,
    address_is_secure: sipua_address_is_secure,
    address_weak_equal: sipua_address_weak_equal,
};
