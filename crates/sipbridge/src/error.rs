//! Error types for the sipua bridge

use sipbridge_sys::c_int;
use thiserror::Error;

use crate::config::ConfigValidationError;
use crate::handle::ForeignHandle;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced at the call site that triggered them
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Native call returned a nonzero status code
    #[error("Native call {call} failed with status {code}")]
    Status {
        /// Entry point name
        call: &'static str,
        /// Raw status code, never interpreted
        code: i32,
    },

    /// Native call that must produce an object returned null
    #[error("Native call {call} returned a null handle")]
    NullHandle {
        /// Entry point name
        call: &'static str,
    },

    /// No engine API table has been installed yet
    #[error("Engine API not installed")]
    NotInstalled,

    /// A different engine API table is already installed
    #[error("A different engine API is already installed")]
    AlreadyInstalled,

    /// Subject proxy missing from the identity cache, so it cannot own a listener
    #[error("{kind} {handle:?} is not tracked by the identity cache")]
    UntrackedSubject {
        /// Proxy kind
        kind: &'static str,
        /// Subject handle
        handle: ForeignHandle,
    },

    /// DTMF digit outside the single-byte range
    #[error("Invalid DTMF digit: {0:?}")]
    InvalidDtmf(char),

    /// String with an interior NUL cannot cross the boundary
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    /// Native status code, for [`BridgeError::Status`].
    pub fn status_code(&self) -> Option<i32> {
        match self {
            BridgeError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Translates a `0 = success` status into a [`Result`].
pub fn check_status(call: &'static str, code: c_int) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        tracing::debug!("{} returned status {}", call, code);
        Err(BridgeError::Status { call, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_status_is_ok() {
        assert!(check_status("sipua_core_start", 0).is_ok());
    }

    #[test]
    fn test_nonzero_status_carries_code_and_call() {
        let err = check_status("sipua_call_accept", -1).unwrap_err();
        assert_eq!(err.status_code(), Some(-1));
        assert_eq!(err.to_string(), "Native call sipua_call_accept failed with status -1");

        let err = check_status("sipua_core_start", 42).unwrap_err();
        assert!(matches!(err, BridgeError::Status { call: "sipua_core_start", code: 42 }));
    }

    #[test]
    fn test_nul_error_converts() {
        let err: BridgeError = std::ffi::CString::new("a\0b").unwrap_err().into();
        assert!(matches!(err, BridgeError::InvalidString(_)));
        assert_eq!(err.status_code(), None);
    }
}
