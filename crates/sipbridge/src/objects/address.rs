use std::ptr;

use sipbridge_sys::SipAddress;

use crate::engine;
use crate::error::{check_status, Result};
use crate::marshal;
use crate::proxy::native_object;

native_object! {
    /// Parsed SIP address.
    Address: SipAddress, state = ()
}

impl Address {
    pub fn username(&self) -> Option<String> {
        // SAFETY: live address; the returned buffer is copied immediately.
        unsafe { marshal::copy_string((engine::api().address_get_username)(self.as_ptr())) }
    }

    pub fn domain(&self) -> String {
        // SAFETY: as above.
        unsafe { marshal::copy_string((engine::api().address_get_domain)(self.as_ptr())) }.unwrap_or_default()
    }

    pub fn display_name(&self) -> Option<String> {
        // SAFETY: as above.
        unsafe { marshal::copy_string((engine::api().address_get_display_name)(self.as_ptr())) }
    }

    /// Sets or clears (`None`) the display name.
    pub fn set_display_name(&self, name: Option<&str>) -> Result<()> {
        let name = name.map(marshal::to_cstring).transpose()?;
        let name_ptr = name.as_ref().map_or(ptr::null(), |name| name.as_ptr());
        // SAFETY: live address; the engine copies the buffer.
        let status = unsafe { (engine::api().address_set_display_name)(self.as_ptr(), name_ptr) };
        check_status("sipua_address_set_display_name", status)
    }

    /// `sips:` scheme.
    pub fn is_secure(&self) -> bool {
        // SAFETY: live address.
        marshal::from_bool(unsafe { (engine::api().address_is_secure)(self.as_ptr()) })
    }

    /// Same user and domain, ignoring display name and parameters.
    pub fn weak_equal(&self, other: &Address) -> bool {
        // SAFETY: both addresses are live.
        marshal::from_bool(unsafe { (engine::api().address_weak_equal)(self.as_ptr(), other.as_ptr()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Factory;
    use sipbridge_testkit as fake;

    fn address(uri: &str) -> Address {
        crate::engine::install(fake::api()).unwrap();
        Factory::get().unwrap().create_address(uri).unwrap()
    }

    #[test]
    fn test_accessors() {
        let address = address("sip:alice@example.org");
        assert_eq!(address.username().as_deref(), Some("alice"));
        assert_eq!(address.domain(), "example.org");
        assert_eq!(address.display_name(), None);

        address.set_display_name(Some("Alice")).unwrap();
        assert_eq!(address.display_name().as_deref(), Some("Alice"));
        address.set_display_name(None).unwrap();
        assert_eq!(address.display_name(), None);
    }

    #[test]
    fn test_username_is_optional() {
        assert_eq!(address("sip:example.org").username(), None);
    }

    #[test]
    fn test_secure_flag_polarity() {
        let plain = address("sip:alice@example.org");
        assert!(!plain.is_secure());
        let secure = address("sips:alice@example.org");
        assert!(secure.is_secure());

        fake::set_address_secure_byte(plain.as_ptr(), 0x40);
        assert!(plain.is_secure());
        fake::set_address_secure_byte(plain.as_ptr(), 0);
        assert!(!plain.is_secure());
    }

    #[test]
    fn test_weak_equal() {
        let a = address("sip:alice@example.org");
        let b = address("sips:alice@example.org");
        let c = address("sip:bob@example.org");
        assert!(a.weak_equal(&b));
        assert!(!a.weak_equal(&c));
        assert_ne!(a, b);
    }
}
