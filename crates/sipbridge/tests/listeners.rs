//! Listener binding and event dispatch through the fake engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sipbridge::objects::{CallState, Core, Factory, GlobalState};
use sipbridge::{from_native, has_live_proxy, stats, NativeObject};
use sipbridge_testkit as fake;

fn factory() -> Factory {
    sipbridge::install(fake::api()).unwrap();
    Factory::get().unwrap()
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    (hits.clone(), hits)
}

#[test]
fn test_rebinding_same_listener_is_idempotent() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let listener = factory.create_core_listener().unwrap();

    core.set_listener(&listener).unwrap();
    core.set_listener(&listener).unwrap();
    assert_eq!(fake::core_callbacks(core.as_ptr()), 1);
    assert_eq!(core.bound_listener().as_ref(), Some(&listener));
    assert!(core.listener().unwrap().ptr_eq(&listener));
}

#[test]
fn test_replacing_listener_detaches_previous() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let first = core.listener().unwrap();
    let (first_hits, sink) = counter();
    first.on_network_reachable(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let second = factory.create_core_listener().unwrap();
    let (second_hits, sink) = counter();
    second.on_network_reachable(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    core.set_listener(&second).unwrap();

    assert_eq!(fake::core_callbacks(core.as_ptr()), 1);
    assert_eq!(fake::refcount(first.as_ptr()), 1);
    fake::fire_network_reachable(core.as_ptr(), 1);
    assert_eq!(first_hits.load(Ordering::SeqCst), 0);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropping_subject_unbinds_listener() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let raw = core.as_ptr();
    let listener = core.listener().unwrap();
    assert_eq!(fake::core_callbacks(raw), 1);

    fake::retain(raw);
    drop(core);
    assert_eq!(fake::core_callbacks(raw), 0);
    assert!(!has_live_proxy(raw));
    assert_eq!(fake::refcount(listener.as_ptr()), 1);

    unsafe { fake::release(raw) };
    assert!(fake::is_destroyed(raw));
}

#[test]
fn test_handler_holding_a_weak_subject_lets_it_go() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let raw = core.as_ptr();
    let weak = core.downgrade();
    let (hits, sink) = counter();
    core.listener().unwrap().on_network_reachable(move |emitter, _| {
        if weak.upgrade().is_some_and(|held| held.ptr_eq(emitter)) {
            sink.fetch_add(1, Ordering::SeqCst);
        }
    });

    fake::fire_network_reachable(raw, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    drop(core);
    assert!(!has_live_proxy(raw));
    assert!(fake::is_destroyed(raw));
}

#[test]
fn test_clearing_the_listener_releases_a_captured_subject() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let raw = core.as_ptr();
    let listener = core.listener().unwrap();
    let captured = core.clone();
    let (hits, sink) = counter();
    listener.on_network_reachable(move |_, _| {
        let _ = captured.is_network_reachable();
        sink.fetch_add(1, Ordering::SeqCst);
    });
    drop(listener);

    let cleared = core.clear_listener().unwrap();
    assert!(core.bound_listener().is_none());
    assert_eq!(fake::core_callbacks(raw), 0);
    fake::fire_network_reachable(raw, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(core.clear_listener().is_none());

    drop(cleared);
    drop(core);
    assert!(!has_live_proxy(raw));
    assert!(fake::is_destroyed(raw));
}

#[test]
fn test_native_token_removal_keeps_live_binding() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let raw = core.as_ptr();
    let (hits, sink) = counter();
    core.listener().unwrap().on_network_reachable(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(fake::data_remove(raw, c"sipbridge.proxy"), 0);
    assert!(has_live_proxy(raw));
    assert!(core.bound_listener().is_some());
    assert_eq!(fake::core_callbacks(raw), 1);
    fake::fire_network_reachable(raw, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    drop(core);
    assert_eq!(fake::core_callbacks(raw), 0);
    assert!(fake::is_destroyed(raw));
}

#[test]
fn test_event_without_subject_proxy_is_dropped() {
    let factory = factory();
    let raw = fake::new_core();
    let listener = factory.create_core_listener().unwrap();
    let (hits, sink) = counter();
    listener.on_global_state_changed(move |_, _, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    unsafe { (fake::api().core_add_callbacks)(raw, listener.as_ptr()) };

    let before = stats().events_dropped;
    fake::fire_global_state_changed(raw, GlobalState::On.as_raw(), "Ready");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(fake::data_entries(raw), 0);
    assert!(stats().events_dropped > before);

    unsafe { (fake::api().core_remove_callbacks)(raw, listener.as_ptr()) };
    unsafe { fake::release(raw) };
}

#[test]
fn test_event_without_handler_creates_no_proxy() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let listener = core.listener().unwrap();
    listener.on_call_state_changed(|_, _, _, _| panic!("handler was cleared"));
    listener.clear_call_state_changed();

    let call = fake::incoming_call(core.as_ptr(), "sip:erin@example.org");
    assert_eq!(fake::data_entries(call), 0);
    assert!(!has_live_proxy(call));
}

#[test]
fn test_callback_set_that_is_not_current_is_ignored() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let (bound_hits, sink) = counter();
    core.listener().unwrap().on_global_state_changed(move |_, _, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    // Attached natively but never bound: the engine calls it, the bridge
    // must not route it to the subject's listener.
    let stray = factory.create_core_listener().unwrap();
    let (stray_hits, sink) = counter();
    stray.on_global_state_changed(move |_, _, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    unsafe { (fake::api().core_add_callbacks)(core.as_ptr(), stray.as_ptr()) };

    fake::fire_global_state_changed(core.as_ptr(), GlobalState::Startup.as_raw(), "Starting");
    assert_eq!(bound_hits.load(Ordering::SeqCst), 1);
    assert_eq!(stray_hits.load(Ordering::SeqCst), 0);

    unsafe { (fake::api().core_remove_callbacks)(core.as_ptr(), stray.as_ptr()) };
}

#[test]
fn test_core_and_call_listeners_see_same_call() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let from_core = Arc::new(Mutex::new(Vec::new()));
    let sink = from_core.clone();
    core.listener().unwrap().on_call_state_changed(move |_, call, state, _| {
        sink.lock().push((call.clone(), state));
    });

    let raw_call = fake::incoming_call(core.as_ptr(), "sip:frank@example.org");
    let call = from_core.lock()[0].0.clone();
    assert_eq!(call.as_ptr(), raw_call);

    let from_call = Arc::new(Mutex::new(Vec::new()));
    let sink = from_call.clone();
    call.listener().unwrap().on_state_changed(move |call, state, message| {
        sink.lock().push((call.clone(), state, message.to_string()));
    });
    call.accept().unwrap();

    let seen = from_call.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|(seen_call, _, _)| seen_call.ptr_eq(&call)));
    assert_eq!(seen[0].1, CallState::Connected);
    assert_eq!(seen[1].1, CallState::StreamsRunning);

    let states: Vec<_> = from_core.lock().iter().map(|(_, state)| *state).collect();
    assert_eq!(
        states,
        [CallState::IncomingReceived, CallState::Connected, CallState::StreamsRunning]
    );
}

#[test]
fn test_network_reachable_polarity() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    core.listener().unwrap().on_network_reachable(move |_, reachable| sink.lock().push(reachable));

    for raw in [0, 1, 2, 0xff] {
        fake::fire_network_reachable(core.as_ptr(), raw);
    }
    assert_eq!(*seen.lock(), [false, true, true, true]);
}

#[test]
fn test_dispatch_from_another_thread() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let (hits, sink) = counter();
    core.listener().unwrap().on_network_reachable(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let raw = fake::SendPtr(core.as_ptr());
    std::thread::spawn(move || {
        for _ in 0..4 {
            fake::fire_network_reachable(raw.get(), 1);
        }
    })
    .join()
    .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[test]
fn test_panicking_handler_does_not_stop_dispatch() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let (hits, sink) = counter();
    core.listener().unwrap().on_global_state_changed(move |_, _, _| {
        if sink.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first event");
        }
    });

    let before = stats().listener_panics;
    fake::fire_global_state_changed(core.as_ptr(), GlobalState::On.as_raw(), "Ready");
    assert!(stats().listener_panics > before);

    fake::fire_global_state_changed(core.as_ptr(), GlobalState::Off.as_raw(), "Off");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(has_live_proxy(core.as_ptr()));
}

#[test]
fn test_handler_receives_the_cached_subject_proxy() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let raw = core.as_ptr();
    let seen = Arc::new(Mutex::new(None::<Core>));
    let sink = seen.clone();
    core.listener().unwrap().on_global_state_changed(move |core, _, _| {
        *sink.lock() = Some(core.clone());
    });

    fake::fire_global_state_changed(raw, GlobalState::On.as_raw(), "Ready");
    let delivered = seen.lock().take().unwrap();
    assert!(delivered.ptr_eq(&core));
    drop(delivered);

    let again = unsafe { from_native::<Core>(raw.cast(), true) }.unwrap();
    assert!(again.ptr_eq(&core));
}
