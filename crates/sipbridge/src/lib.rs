//! Safe bridge over the sipua SIP/media engine
//!
//! The engine is a C library of reference-counted objects that reports
//! events through callback sets. This crate keeps exactly one Rust proxy per
//! native object, ties native refcounts to proxy lifetimes, and routes
//! native callbacks to Rust handlers.
//!
//! # Architecture
//!
//! - **engine.rs**: the installed [`EngineApi`] table every native call goes through
//! - **registry.rs**: identity cache arena keyed by native address
//! - **proxy.rs**: proxy construction, reference ownership, [`from_native`]
//! - **listener.rs / dispatch.rs**: listener binding and event delivery
//! - **list.rs**: native cons-cell lists to and from Rust collections
//! - **objects/**: typed wrappers (`Factory`, `Core`, `Call`, `Address`, listeners)
//!
//! # Usage
//!
//! ```no_run
//! use sipbridge::objects::{CallState, Factory};
//! use sipbridge::BridgeConfig;
//!
//! # fn run(api: &'static sipbridge::EngineApi) -> sipbridge::Result<()> {
//! sipbridge::init(api, &BridgeConfig::default())?;
//! let factory = Factory::get()?;
//! let core = factory.create_core(None)?;
//! core.listener()?.on_call_state_changed(|_, call, state, _| {
//!     if state == CallState::IncomingReceived {
//!         let _ = call.accept();
//!     }
//! });
//! core.start()?;
//! loop {
//!     core.iterate();
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

mod config;
mod dispatch;
mod engine;
mod error;
mod handle;
mod list;
mod listener;
pub mod logging;
mod marshal;
pub mod objects;
mod proxy;
mod registry;
mod stats;

pub use config::{BridgeConfig, ConfigValidationError, DispatchPanicPolicy, LOG_FILTER_ENV};
pub use dispatch::{dispatch_panic_policy, set_dispatch_panic_policy};
pub use engine::{install, is_installed};
pub use error::{check_status, BridgeError, Result};
pub use handle::ForeignHandle;
pub use list::{DisposalSet, NativeObjectList, NativeStringList, ObjectIter, ObjectList, StringIter, StringList};
pub use listener::EventSlot;
pub use proxy::{from_native, NativeObject, Proxy, WeakObject};
pub use sipbridge_sys::EngineApi;
pub use stats::{has_live_proxy, stats, BridgeStats};

/// Validates `config`, installs `api` and applies the configuration.
///
/// Does not install a tracing subscriber; call [`logging::init_tracing`]
/// for that if the application has none of its own.
pub fn init(api: &'static EngineApi, config: &BridgeConfig) -> Result<()> {
    config.validate()?;
    install(api)?;
    set_dispatch_panic_policy(config.dispatch_panic);
    if config.forward_native_logs {
        logging::forward_native_logs()?;
    }
    tracing::info!(
        "sipbridge initialized (dispatch_panic: {:?}, native logs: {})",
        config.dispatch_panic,
        config.forward_native_logs
    );
    Ok(())
}
