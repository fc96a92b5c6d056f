use sipbridge_sys::{EngineApi, SipCore};

use crate::engine;
use crate::error::{check_status, BridgeError, Result};
use crate::handle::ForeignHandle;
use crate::list::{NativeStringList, ObjectList, StringList};
use crate::listener::{self, Subject};
use crate::marshal;
use crate::objects::{Address, Call, CoreListener, Factory};
use crate::proxy::{from_native, native_object};

native_object! {
    /// Engine instance: owns calls and runs the main loop.
    Core: SipCore, state = ()
}

impl Core {
    pub fn version(&self) -> String {
        // SAFETY: live core; the returned buffer is copied immediately.
        unsafe { marshal::copy_string((engine::api().core_get_version)(self.as_ptr())) }.unwrap_or_default()
    }

    pub fn start(&self) -> Result<()> {
        tracing::info!("starting core {:?}", self);
        // SAFETY: live core.
        check_status("sipua_core_start", unsafe { (engine::api().core_start)(self.as_ptr()) })
    }

    pub fn stop(&self) {
        tracing::info!("stopping core {:?}", self);
        // SAFETY: live core.
        unsafe { (engine::api().core_stop)(self.as_ptr()) }
    }

    /// Runs one main-loop step. Must be called periodically from the thread
    /// that owns the core.
    pub fn iterate(&self) {
        // SAFETY: live core.
        unsafe { (engine::api().core_iterate)(self.as_ptr()) }
    }

    pub fn invite_address(&self, address: &Address) -> Result<Call> {
        tracing::debug!("inviting {:?} on {:?}", address, self);
        // SAFETY: live core and address. The core keeps its own reference to
        // the new call, so the proxy takes one of its own.
        unsafe {
            let raw = (engine::api().core_invite_address)(self.as_ptr(), address.as_ptr());
            from_native(raw.cast(), true).ok_or(BridgeError::NullHandle {
                call: "sipua_core_invite_address",
            })
        }
    }

    /// Snapshot of the core's calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        // SAFETY: the list belongs to the core and is only read before any
        // other call into the engine.
        unsafe { ObjectList::<Call>::new((engine::api().core_get_calls)(self.as_ptr())) }
            .iter()
            .collect()
    }

    pub fn current_call(&self) -> Option<Call> {
        // SAFETY: live core; the call is borrowed, the proxy takes a reference.
        unsafe { from_native((engine::api().core_get_current_call)(self.as_ptr()).cast(), true) }
    }

    pub fn terminate_all_calls(&self) -> Result<()> {
        // SAFETY: live core.
        let status = unsafe { (engine::api().core_terminate_all_calls)(self.as_ptr()) };
        check_status("sipua_core_terminate_all_calls", status)
    }

    pub fn mic_enabled(&self) -> bool {
        // SAFETY: live core.
        marshal::from_bool(unsafe { (engine::api().core_mic_enabled)(self.as_ptr()) })
    }

    pub fn enable_mic(&self, enable: bool) {
        // SAFETY: live core.
        unsafe { (engine::api().core_enable_mic)(self.as_ptr(), marshal::to_bool(enable)) }
    }

    pub fn is_network_reachable(&self) -> bool {
        // SAFETY: live core.
        marshal::from_bool(unsafe { (engine::api().core_is_network_reachable)(self.as_ptr()) })
    }

    pub fn supported_tags(&self) -> Vec<String> {
        // SAFETY: the list belongs to the core and is read immediately.
        unsafe { StringList::new((engine::api().core_get_supported_tags)(self.as_ptr())) }
            .iter()
            .collect()
    }

    pub fn set_supported_tags<I, S>(&self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = NativeStringList::new(tags)?;
        // SAFETY: live core; the engine copies the strings before returning.
        let status = unsafe { (engine::api().core_set_supported_tags)(self.as_ptr(), tags.as_ptr()) };
        tags.release();
        check_status("sipua_core_set_supported_tags", status)
    }

    /// Bound listener, created and attached on first access.
    ///
    /// The core owns its listener and the listener owns its handlers, so a
    /// handler must use the core it is called with rather than capture this
    /// one. Capture [`downgrade`](crate::NativeObject::downgrade) instead when needed.
    pub fn listener(&self) -> Result<CoreListener> {
        listener::get_or_bind(self)
    }

    /// Binds `listener` in place of the current one. Binding the already
    /// bound listener again changes nothing.
    pub fn set_listener(&self, listener: &CoreListener) -> Result<()> {
        listener::bind(self, listener)
    }

    /// Detaches and returns the bound listener. Events stop until another
    /// one is bound.
    pub fn clear_listener(&self) -> Option<CoreListener> {
        listener::unbind(self)
    }

    /// Bound listener, without creating one.
    pub fn bound_listener(&self) -> Option<CoreListener> {
        listener::bound(self)
    }
}

impl Subject for Core {
    type Listener = CoreListener;

    fn create_listener() -> Result<CoreListener> {
        Factory::get()?.create_core_listener()
    }

    fn attach(api: &EngineApi, subject: ForeignHandle, cbs: ForeignHandle) {
        // SAFETY: both handles are held by live proxies.
        unsafe { (api.core_add_callbacks)(subject.cast(), cbs.cast()) }
    }

    fn detach(api: &EngineApi, subject: ForeignHandle, cbs: ForeignHandle) {
        // SAFETY: the subject is still referenced by its dropping proxy and the
        // callback set by the binding being released.
        unsafe { (api.core_remove_callbacks)(subject.cast(), cbs.cast()) }
    }

    fn current_callbacks(api: &EngineApi, subject: ForeignHandle) -> Option<ForeignHandle> {
        // SAFETY: called from dispatch while the engine holds the subject.
        ForeignHandle::new(unsafe { (api.core_get_current_callbacks)(subject.cast()) })
    }
}
