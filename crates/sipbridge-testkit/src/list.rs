//! Cons-cell lists with per-thread traversal counters

use std::cell::Cell;
use std::ptr;

use sipbridge_sys::*;

thread_local! {
    static NEXT_CALLS: Cell<usize> = const { Cell::new(0) };
    static DATA_READS: Cell<usize> = const { Cell::new(0) };
    static LIVE_CELLS: Cell<isize> = const { Cell::new(0) };
}

/// # Safety
///
/// `list` must be null or a list built by [`append`].
pub(crate) unsafe fn append(list: *mut SipList, data: *mut c_void) -> *mut SipList {
    let cell = Box::into_raw(Box::new(SipList {
        next: ptr::null_mut(),
        data,
    }));
    LIVE_CELLS.with(|live| live.set(live.get() + 1));
    if list.is_null() {
        return cell;
    }
    let mut tail = list;
    while !(*tail).next.is_null() {
        tail = (*tail).next;
    }
    (*tail).next = cell;
    list
}

/// # Safety
///
/// `list` must be null or a list built by [`append`] that is not used again.
pub(crate) unsafe fn free(list: *mut SipList) {
    let mut cell = list;
    while !cell.is_null() {
        let owned = Box::from_raw(cell);
        cell = owned.next;
        LIVE_CELLS.with(|live| live.set(live.get() - 1));
    }
}

pub(crate) unsafe extern "C" fn list_next(node: *const SipList) -> *mut SipList {
    NEXT_CALLS.with(|calls| calls.set(calls.get() + 1));
    if node.is_null() {
        ptr::null_mut()
    } else {
        (*node).next
    }
}

pub(crate) unsafe extern "C" fn list_get_data(node: *const SipList) -> *mut c_void {
    DATA_READS.with(|reads| reads.set(reads.get() + 1));
    if node.is_null() {
        ptr::null_mut()
    } else {
        (*node).data
    }
}

pub(crate) unsafe extern "C" fn list_append(list: *mut SipList, data: *mut c_void) -> *mut SipList {
    append(list, data)
}

pub(crate) unsafe extern "C" fn list_free(list: *mut SipList) {
    free(list)
}

/// Number of `list_next` calls made on this thread since the last reset.
pub fn next_calls() -> usize {
    NEXT_CALLS.with(Cell::get)
}

/// Number of `list_get_data` calls made on this thread since the last reset.
pub fn data_reads() -> usize {
    DATA_READS.with(Cell::get)
}

/// Cells allocated minus cells freed on this thread.
pub fn live_cells() -> isize {
    LIVE_CELLS.with(Cell::get)
}

pub fn reset_counters() {
    NEXT_CALLS.with(|calls| calls.set(0));
    DATA_READS.with(|reads| reads.set(0));
}

/// Builds a list from raw element pointers, in order.
pub fn build(items: &[*mut c_void]) -> *mut SipList {
    items
        .iter()
        // SAFETY: the accumulator starts null and is only extended by append.
        .fold(ptr::null_mut(), |list, item| unsafe { append(list, *item) })
}

/// Frees a list returned by [`build`].
///
/// # Safety
///
/// `list` must come from [`build`] and must not be used afterwards.
pub unsafe fn release(list: *mut SipList) {
    free(list)
}
