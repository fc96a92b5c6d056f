//! Native list marshalling against the fake engine's cons cells

use sipbridge::objects::{Address, Core, Factory};
use sipbridge::{BridgeError, NativeObjectList, NativeStringList, ObjectList, StringList};
use sipbridge_sys::c_void;
use sipbridge_testkit as fake;
use sipbridge_testkit::list as cells;

fn factory() -> Factory {
    sipbridge::install(fake::api()).unwrap();
    Factory::get().unwrap()
}

#[test]
fn test_object_list_round_trip() {
    let factory = factory();
    for count in [0usize, 1, 7] {
        let addresses: Vec<Address> = (0..count)
            .map(|i| factory.create_address(&format!("sip:user{i}@example.org")).unwrap())
            .collect();

        let native = NativeObjectList::new(&addresses);
        assert_eq!(native.len(), count);

        cells::reset_counters();
        let read: Vec<Address> = unsafe { ObjectList::<Address>::new(native.as_ptr()) }.iter().collect();
        assert_eq!(read, addresses);
        assert!(cells::next_calls() <= count + 1);
        assert_eq!(cells::data_reads(), count);

        for address in &addresses {
            assert_eq!(fake::refcount(address.as_ptr()), 1);
        }
    }
}

#[test]
fn test_building_a_list_frees_its_cells() {
    let factory = factory();
    let cells_before = cells::live_cells();
    {
        let core = factory.create_core(None).unwrap();
        let cores = vec![core.clone(), core];
        let native = NativeObjectList::new(&cores);
        assert_eq!(native.len(), 2);
        assert_eq!(cells::live_cells(), cells_before + 2);

        let strings = NativeStringList::new(["a", "b", "c"]).unwrap();
        assert_eq!(strings.disposal_set().len(), 3);
        assert_eq!(cells::live_cells(), cells_before + 5);
        strings.release();
        assert_eq!(cells::live_cells(), cells_before + 2);
    }
    assert_eq!(cells::live_cells(), cells_before);
}

#[test]
fn test_interior_nul_fails_without_leaking() {
    factory();
    let cells_before = cells::live_cells();
    let err = NativeStringList::new(["ok", "bad\0tag", "never"]).err().unwrap();
    assert!(matches!(err, BridgeError::InvalidString(_)));
    assert_eq!(cells::live_cells(), cells_before);
}

#[test]
fn test_engine_lists_are_read_lazily() {
    let factory = factory();
    let cores: Vec<Core> = (0..3).map(|_| factory.create_core(None).unwrap()).collect();
    let raw = cells::build(&cores.iter().map(|core| core.as_ptr().cast::<c_void>()).collect::<Vec<_>>());

    cells::reset_counters();
    let list = unsafe { ObjectList::<Core>::new(raw) };
    let first = list.iter().next().unwrap();
    assert!(first.ptr_eq(&cores[0]));
    assert_eq!(cells::data_reads(), 1);

    // Restarting yields the whole list again.
    assert_eq!(list.iter().count(), 3);
    unsafe { cells::release(raw) };
}

#[test]
fn test_supported_tags_survive_the_engine_copy() {
    let factory = factory();
    let core = factory.create_core(None).unwrap();
    let tags = ["replaces", "outbound", "gruu"];
    core.set_supported_tags(tags).unwrap();
    assert_eq!(fake::stored_tags(core.as_ptr()), tags);

    let read: Vec<String> = unsafe {
        StringList::new((fake::api().core_get_supported_tags)(core.as_ptr()))
    }
    .iter()
    .collect();
    assert_eq!(read, tags);
    assert_eq!(core.supported_tags(), tags);

    let err = core.set_supported_tags(["ok", "nul\0"]).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidString(_)));
    assert_eq!(fake::stored_tags(core.as_ptr()), tags);
}
