//! Typed object surface
//!
//! One wrapper per native object kind, each a cheap handle to the single
//! proxy of its native object: cloning shares the proxy, equality is proxy
//! identity.

mod address;
mod call;
mod core;
mod enums;
mod factory;
mod listeners;

pub use address::Address;
pub use call::Call;
pub use self::core::Core;
pub use enums::{CallState, GlobalState};
pub use factory::Factory;
pub use listeners::{
    CallListener, CallListenerState, CallStateHandler, CoreCallStateHandler, CoreListener, CoreListenerState,
    DtmfHandler, GlobalStateHandler, NetworkReachableHandler,
};
