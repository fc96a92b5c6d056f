use std::path::Path;
use std::ptr;

use sipbridge_sys::SipFactory;

use crate::engine;
use crate::error::{BridgeError, Result};
use crate::marshal;
use crate::objects::{Address, CallListener, Core, CoreListener};
use crate::proxy::{from_native, native_object, NativeObject};

native_object! {
    /// Process-wide engine factory; every other object starts here.
    Factory: SipFactory, state = ()
}

/// Wraps the result of a create call, adopting the creator's reference.
///
/// # Safety
///
/// `raw` must be null or a fresh `T` owned by the caller.
unsafe fn adopt<T: NativeObject, R>(call: &'static str, raw: *mut R) -> Result<T> {
    from_native(raw.cast(), false).ok_or(BridgeError::NullHandle { call })
}

impl Factory {
    pub fn get() -> Result<Self> {
        let api = engine::try_api()?;
        // SAFETY: the singleton is owned by the engine; the proxy takes its own
        // reference.
        unsafe { from_native((api.factory_get)().cast(), true) }
            .ok_or(BridgeError::NullHandle { call: "sipua_factory_get" })
    }

    pub fn create_core(&self, config_path: Option<&Path>) -> Result<Core> {
        let config_path = config_path
            .map(|path| marshal::to_cstring(&path.to_string_lossy()))
            .transpose()?;
        let config_ptr = config_path.as_ref().map_or(ptr::null(), |path| path.as_ptr());
        tracing::debug!("creating core (config: {:?})", config_path);
        // SAFETY: the factory is live and the path outlives the call.
        unsafe {
            let raw = (engine::api().factory_create_core)(self.as_ptr(), config_ptr);
            adopt("sipua_factory_create_core", raw)
        }
    }

    /// Parses `uri`; unparsable input is reported as a null handle.
    pub fn create_address(&self, uri: &str) -> Result<Address> {
        let uri = marshal::to_cstring(uri)?;
        // SAFETY: the factory is live and `uri` outlives the call.
        unsafe {
            let raw = (engine::api().factory_create_address)(self.as_ptr(), uri.as_ptr());
            adopt("sipua_factory_create_address", raw)
        }
    }

    /// New, unbound core listener. Usually obtained through [`Core::listener`].
    pub fn create_core_listener(&self) -> Result<CoreListener> {
        // SAFETY: the factory is live.
        unsafe {
            let raw = (engine::api().factory_create_core_cbs)(self.as_ptr());
            adopt("sipua_factory_create_core_cbs", raw)
        }
    }

    /// New, unbound call listener. Usually obtained through [`crate::objects::Call::listener`].
    pub fn create_call_listener(&self) -> Result<CallListener> {
        // SAFETY: the factory is live.
        unsafe {
            let raw = (engine::api().factory_create_call_cbs)(self.as_ptr());
            adopt("sipua_factory_create_call_cbs", raw)
        }
    }
}
