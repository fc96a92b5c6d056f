//! Event delivery from native callback shims to listener handlers
//!
//! Shims are plain `extern "C"` functions that capture nothing. Everything
//! they need is recovered from their native arguments: the emitting subject's
//! identity slot gives its live proxy and bound listener, and the engine's
//! current-callbacks accessor says whether that listener is the one being
//! dispatched. Events for subjects without a live proxy, without a binding
//! or without a handler are dropped without creating any proxy.
//!
//! Handlers run inside `catch_unwind`; a panic never unwinds into the engine.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};

use sipbridge_sys::c_void;

use crate::config::DispatchPanicPolicy;
use crate::engine;
use crate::handle::ForeignHandle;
use crate::listener::{downcast_listener, Subject};
use crate::proxy::{NativeObject, Proxy};
use crate::registry;
use crate::stats;

static PANIC_POLICY: AtomicU8 = AtomicU8::new(0);

pub fn set_dispatch_panic_policy(policy: DispatchPanicPolicy) {
    let raw = match policy {
        DispatchPanicPolicy::Log => 0,
        DispatchPanicPolicy::Abort => 1,
    };
    PANIC_POLICY.store(raw, Ordering::Relaxed);
}

pub fn dispatch_panic_policy() -> DispatchPanicPolicy {
    match PANIC_POLICY.load(Ordering::Relaxed) {
        1 => DispatchPanicPolicy::Abort,
        _ => DispatchPanicPolicy::Log,
    }
}

/// Delivers `event` emitted by `subject` to its bound listener.
///
/// `invoke` receives the subject and listener proxies and returns whether a
/// handler was present. It must check the handler before translating any
/// other argument, so that nothing is resolved for dropped events.
pub(crate) fn deliver<S, F>(event: &'static str, subject: *mut c_void, invoke: F)
where
    S: Subject,
    F: FnOnce(&S, &S::Listener) -> bool,
{
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let Some(handle) = ForeignHandle::new(subject) else {
            return false;
        };
        let Ok(api) = engine::try_api() else {
            return false;
        };
        let Some(target) = registry::dispatch_target(handle) else {
            tracing::trace!("{} on {:?} dropped: no bound listener", event, handle);
            return false;
        };
        if S::current_callbacks(api, handle) != Some(target.cbs) {
            tracing::trace!("{} on {:?} dropped: not the current callback set", event, handle);
            return false;
        }
        let Ok(subject_proxy) = target.subject.downcast::<Proxy<S::State>>() else {
            tracing::warn!("{} on {:?} dropped: subject is not a {}", event, handle, S::KIND);
            return false;
        };
        let Some(listener) = downcast_listener::<S::Listener>(target.listener) else {
            tracing::warn!("{} on {:?} dropped: unexpected listener kind", event, handle);
            return false;
        };
        let subject = S::from_proxy(subject_proxy);
        invoke(&subject, &listener)
    }));

    match outcome {
        Ok(true) => stats::record_delivered(),
        Ok(false) => stats::record_dropped(),
        Err(payload) => report_panic(event, payload.as_ref()),
    }
}

fn report_panic(event: &'static str, payload: &(dyn Any + Send)) {
    stats::record_panic();
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    tracing::error!(event, "listener handler panicked: {}", message);
    if dispatch_panic_policy() == DispatchPanicPolicy::Abort {
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_round_trip() {
        assert_eq!(dispatch_panic_policy(), DispatchPanicPolicy::Log);
        set_dispatch_panic_policy(DispatchPanicPolicy::Log);
        assert_eq!(dispatch_panic_policy(), DispatchPanicPolicy::Log);
    }

    #[test]
    fn test_report_panic_counts_and_continues() {
        let before = stats::stats().listener_panics;
        report_panic("test_event", &"boom");
        report_panic("test_event", &String::from("boom"));
        report_panic("test_event", &42u32);
        assert!(stats::stats().listener_panics >= before + 3);
    }
}
