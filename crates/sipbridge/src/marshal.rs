//! Scalar marshaling: native strings and boolean bytes

use std::ffi::{CStr, CString};

use sipbridge_sys::{bool_t, c_char};

use crate::error::Result;

/// Copies a borrowed native string. Null maps to `None`; invalid UTF-8 is
/// replaced rather than rejected.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated buffer valid for the
/// duration of the call.
pub(crate) unsafe fn copy_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

pub(crate) fn to_cstring(value: &str) -> Result<CString> {
    Ok(CString::new(value)?)
}

/// Native boolean byte to `bool`: zero is false, anything else true.
pub(crate) fn from_bool(byte: bool_t) -> bool {
    byte != 0
}

pub(crate) fn to_bool(value: bool) -> bool_t {
    bool_t::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn test_copy_string_null_and_lossy() {
        assert_eq!(unsafe { copy_string(std::ptr::null()) }, None);

        let text = CString::new("sip:alice@example.org").unwrap();
        assert_eq!(unsafe { copy_string(text.as_ptr()) }.as_deref(), Some("sip:alice@example.org"));

        let bytes = [b'a', 0xff, b'b', 0];
        let copied = unsafe { copy_string(bytes.as_ptr().cast()) }.unwrap();
        assert_eq!(copied, "a\u{fffd}b");
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        assert!(matches!(to_cstring("bad\0tag"), Err(BridgeError::InvalidString(_))));
        assert_eq!(to_cstring("ok").unwrap().as_bytes(), b"ok");
    }

    #[test]
    fn test_boolean_polarity() {
        assert!(!from_bool(0));
        assert!(from_bool(1));
        assert!(from_bool(0x80));
        assert_eq!(to_bool(true), 1);
        assert_eq!(to_bool(false), 0);
    }
}
