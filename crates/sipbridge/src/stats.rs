//! Process-wide bridge counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::handle::ForeignHandle;
use crate::registry;

static EVENTS_DELIVERED: AtomicU64 = AtomicU64::new(0);
static EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0);
static LISTENER_PANICS: AtomicU64 = AtomicU64::new(0);

/// Snapshot of the identity cache and dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    /// Native objects with a slot in the identity cache
    pub tracked_objects: usize,
    /// Subjects with a bound listener
    pub bound_listeners: usize,
    /// Events handed to a listener handler
    pub events_delivered: u64,
    /// Events dropped for lack of a live subject, binding or handler
    pub events_dropped: u64,
    /// Listener handlers that panicked
    pub listener_panics: u64,
}

pub fn stats() -> BridgeStats {
    let (tracked_objects, bound_listeners) = registry::counts();
    BridgeStats {
        tracked_objects,
        bound_listeners,
        events_delivered: EVENTS_DELIVERED.load(Ordering::Relaxed),
        events_dropped: EVENTS_DROPPED.load(Ordering::Relaxed),
        listener_panics: LISTENER_PANICS.load(Ordering::Relaxed),
    }
}

/// Whether a live proxy currently exists for the native object at `ptr`.
pub fn has_live_proxy<T>(ptr: *const T) -> bool {
    ForeignHandle::from_const(ptr).is_some_and(|handle| registry::lookup(handle).is_some())
}

pub(crate) fn record_delivered() {
    EVENTS_DELIVERED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_dropped() {
    EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_panic() {
    LISTENER_PANICS.fetch_add(1, Ordering::Relaxed);
}
