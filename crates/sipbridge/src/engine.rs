//! Process-wide engine entry-point table

use std::sync::OnceLock;

use sipbridge_sys::EngineApi;

use crate::error::{BridgeError, Result};

static ENGINE: OnceLock<&'static EngineApi> = OnceLock::new();

/// Installs the native entry-point table.
///
/// The first table installed wins. Installing the same table again is a
/// no-op; installing a different one fails.
pub fn install(api: &'static EngineApi) -> Result<()> {
    let installed = *ENGINE.get_or_init(|| {
        tracing::info!("sipua engine API installed");
        api
    });
    if std::ptr::eq(installed, api) {
        Ok(())
    } else {
        Err(BridgeError::AlreadyInstalled)
    }
}

pub fn is_installed() -> bool {
    ENGINE.get().is_some()
}

/// Installed table, for entry points reachable without an existing proxy.
pub(crate) fn try_api() -> Result<&'static EngineApi> {
    ENGINE.get().copied().ok_or(BridgeError::NotInstalled)
}

/// Installed table, for code that holds a proxy (which implies install).
pub(crate) fn api() -> &'static EngineApi {
    match ENGINE.get() {
        Some(api) => api,
        None => panic!("sipbridge used before an engine API was installed"),
    }
}
