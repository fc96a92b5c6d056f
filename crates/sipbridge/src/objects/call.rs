use sipbridge_sys::{c_char, EngineApi, SipCall};

use crate::engine;
use crate::error::{check_status, BridgeError, Result};
use crate::handle::ForeignHandle;
use crate::listener::{self, Subject};
use crate::marshal;
use crate::objects::{Address, CallListener, CallState, Core, Factory};
use crate::proxy::{from_native, native_object};

native_object! {
    /// One call leg. Calls are created by the engine (incoming) or by
    /// [`Core::invite_address`]; the owning core keeps its own reference.
    Call: SipCall, state = ()
}

impl Call {
    /// Owning core.
    pub fn core(&self) -> Option<Core> {
        // SAFETY: live call; the core is borrowed, the proxy takes a reference.
        unsafe { from_native((engine::api().call_get_core)(self.as_ptr()).cast(), true) }
    }

    pub fn remote_address(&self) -> Option<Address> {
        // SAFETY: as above.
        unsafe {
            let raw = (engine::api().call_get_remote_address)(self.as_ptr());
            from_native(raw.cast_mut().cast(), true)
        }
    }

    pub fn state(&self) -> CallState {
        // SAFETY: live call.
        CallState::from_raw(unsafe { (engine::api().call_get_state)(self.as_ptr()) })
    }

    pub fn accept(&self) -> Result<()> {
        tracing::debug!("accepting {:?}", self);
        // SAFETY: live call.
        check_status("sipua_call_accept", unsafe { (engine::api().call_accept)(self.as_ptr()) })
    }

    pub fn terminate(&self) -> Result<()> {
        tracing::debug!("terminating {:?}", self);
        // SAFETY: live call.
        check_status("sipua_call_terminate", unsafe { (engine::api().call_terminate)(self.as_ptr()) })
    }

    pub fn is_recording(&self) -> bool {
        // SAFETY: live call.
        marshal::from_bool(unsafe { (engine::api().call_is_recording)(self.as_ptr()) })
    }

    /// Sends one DTMF digit (`0-9`, `*`, `#`, `A-D`).
    pub fn send_dtmf(&self, dtmf: char) -> Result<()> {
        if !dtmf.is_ascii() {
            return Err(BridgeError::InvalidDtmf(dtmf));
        }
        // SAFETY: live call.
        let status = unsafe { (engine::api().call_send_dtmf)(self.as_ptr(), dtmf as u8 as c_char) };
        check_status("sipua_call_send_dtmf", status)
    }

    /// Bound listener, created and attached on first access. As with
    /// [`Core::listener`], handlers must not capture the call they belong to.
    pub fn listener(&self) -> Result<CallListener> {
        listener::get_or_bind(self)
    }

    pub fn set_listener(&self, listener: &CallListener) -> Result<()> {
        listener::bind(self, listener)
    }

    pub fn clear_listener(&self) -> Option<CallListener> {
        listener::unbind(self)
    }

    pub fn bound_listener(&self) -> Option<CallListener> {
        listener::bound(self)
    }
}

impl Subject for Call {
    type Listener = CallListener;

    fn create_listener() -> Result<CallListener> {
        Factory::get()?.create_call_listener()
    }

    fn attach(api: &EngineApi, subject: ForeignHandle, cbs: ForeignHandle) {
        // SAFETY: both handles are held by live proxies.
        unsafe { (api.call_add_callbacks)(subject.cast(), cbs.cast()) }
    }

    fn detach(api: &EngineApi, subject: ForeignHandle, cbs: ForeignHandle) {
        // SAFETY: see `Core::detach`.
        unsafe { (api.call_remove_callbacks)(subject.cast(), cbs.cast()) }
    }

    fn current_callbacks(api: &EngineApi, subject: ForeignHandle) -> Option<ForeignHandle> {
        // SAFETY: called from dispatch while the engine holds the subject.
        ForeignHandle::new(unsafe { (api.call_get_current_callbacks)(subject.cast()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipbridge_testkit as fake;

    fn core() -> Core {
        crate::engine::install(fake::api()).unwrap();
        Factory::get().unwrap().create_core(None).unwrap()
    }

    fn incoming(core: &Core) -> Call {
        let raw = fake::incoming_call(core.as_ptr(), "sip:carol@example.org");
        unsafe { from_native(raw.cast(), true) }.unwrap()
    }

    #[test]
    fn test_navigation_reuses_proxies() {
        let core = core();
        let call = incoming(&core);
        assert_eq!(call.core().as_ref(), Some(&core));

        let remote = call.remote_address().unwrap();
        assert_eq!(remote.username().as_deref(), Some("carol"));
        assert!(remote.ptr_eq(&call.remote_address().unwrap()));
    }

    #[test]
    fn test_accept_transitions_and_status_errors() {
        let core = core();
        let call = incoming(&core);
        assert_eq!(call.state(), CallState::IncomingReceived);

        call.send_dtmf('1').unwrap_err();
        call.accept().unwrap();
        assert_eq!(call.state(), CallState::StreamsRunning);

        let err = call.accept().unwrap_err();
        assert!(matches!(err, BridgeError::Status { call: "sipua_call_accept", code: -1 }));

        call.send_dtmf('4').unwrap();
        call.send_dtmf('#').unwrap();
        assert_eq!(fake::sent_dtmfs(call.as_ptr()), "4#");
        assert!(matches!(call.send_dtmf('é'), Err(BridgeError::InvalidDtmf('é'))));

        call.terminate().unwrap();
        assert_eq!(call.state(), CallState::End);
        assert!(call.terminate().is_err());
    }

    #[test]
    fn test_recording_polarity() {
        let core = core();
        let call = incoming(&core);
        assert!(!call.is_recording());
        fake::set_recording_byte(call.as_ptr(), 1);
        assert!(call.is_recording());
        fake::set_recording_byte(call.as_ptr(), 0);
        assert!(!call.is_recording());
    }
}
