//! Tracing setup and native log forwarding

use std::panic::{catch_unwind, AssertUnwindSafe};

use sipbridge_sys::*;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::BridgeConfig;
use crate::engine;
use crate::error::Result;
use crate::marshal;

/// Target used for events forwarded from the engine.
pub const NATIVE_TARGET: &str = "sipbridge::native";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to the
/// configured filter. Does nothing if a global subscriber already exists.
pub fn init_tracing(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

/// Routes the engine's log output into `tracing` under [`NATIVE_TARGET`].
pub fn forward_native_logs() -> Result<()> {
    let api = engine::try_api()?;
    // SAFETY: the shim is a plain function valid for the process lifetime.
    unsafe { (api.logging_set_handler)(Some(native_log_shim)) };
    tracing::debug!("native log forwarding enabled");
    Ok(())
}

/// Restores the engine's default log output.
pub fn stop_forwarding_native_logs() -> Result<()> {
    let api = engine::try_api()?;
    // SAFETY: clearing the handler is always valid.
    unsafe { (api.logging_set_handler)(None) };
    Ok(())
}

/// Maps a native log level to a `tracing` level. Unknown levels log as info.
pub fn native_level(level: c_int) -> Level {
    match level {
        SIPUA_LOG_TRACE => Level::TRACE,
        SIPUA_LOG_DEBUG => Level::DEBUG,
        SIPUA_LOG_MESSAGE => Level::INFO,
        SIPUA_LOG_WARNING => Level::WARN,
        SIPUA_LOG_ERROR | SIPUA_LOG_FATAL => Level::ERROR,
        _ => Level::INFO,
    }
}

unsafe extern "C" fn native_log_shim(domain: *const c_char, level: c_int, message: *const c_char) {
    let domain = marshal::copy_string(domain).unwrap_or_default();
    let message = marshal::copy_string(message).unwrap_or_default();
    // A broken subscriber must not unwind into the engine.
    let _ = catch_unwind(AssertUnwindSafe(|| match native_level(level) {
        Level::TRACE => tracing::trace!(target: NATIVE_TARGET, domain = %domain, "{}", message),
        Level::DEBUG => tracing::debug!(target: NATIVE_TARGET, domain = %domain, "{}", message),
        Level::INFO => tracing::info!(target: NATIVE_TARGET, domain = %domain, "{}", message),
        Level::WARN => tracing::warn!(target: NATIVE_TARGET, domain = %domain, "{}", message),
        _ => tracing::error!(target: NATIVE_TARGET, domain = %domain, "{}", message),
    }));
}
