//! Engine enumerations

use std::fmt;

use serde::{Deserialize, Serialize};
use sipbridge_sys::*;

/// Engine lifecycle state reported by `global_state_changed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum GlobalState {
    Off,
    Startup,
    On,
    Shutdown,
    Configuring,
    /// Value this binding does not know about
    Unknown(i32),
}

impl GlobalState {
    pub fn from_raw(raw: c_int) -> Self {
        match raw {
            SIPUA_GLOBAL_OFF => Self::Off,
            SIPUA_GLOBAL_STARTUP => Self::Startup,
            SIPUA_GLOBAL_ON => Self::On,
            SIPUA_GLOBAL_SHUTDOWN => Self::Shutdown,
            SIPUA_GLOBAL_CONFIGURING => Self::Configuring,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(self) -> c_int {
        match self {
            Self::Off => SIPUA_GLOBAL_OFF,
            Self::Startup => SIPUA_GLOBAL_STARTUP,
            Self::On => SIPUA_GLOBAL_ON,
            Self::Shutdown => SIPUA_GLOBAL_SHUTDOWN,
            Self::Configuring => SIPUA_GLOBAL_CONFIGURING,
            Self::Unknown(raw) => raw,
        }
    }
}

/// Call leg state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CallState {
    Idle,
    IncomingReceived,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    Connected,
    StreamsRunning,
    Paused,
    End,
    Error,
    Released,
    /// Value this binding does not know about
    Unknown(i32),
}

impl CallState {
    pub fn from_raw(raw: c_int) -> Self {
        match raw {
            SIPUA_CALL_IDLE => Self::Idle,
            SIPUA_CALL_INCOMING_RECEIVED => Self::IncomingReceived,
            SIPUA_CALL_OUTGOING_INIT => Self::OutgoingInit,
            SIPUA_CALL_OUTGOING_PROGRESS => Self::OutgoingProgress,
            SIPUA_CALL_OUTGOING_RINGING => Self::OutgoingRinging,
            SIPUA_CALL_CONNECTED => Self::Connected,
            SIPUA_CALL_STREAMS_RUNNING => Self::StreamsRunning,
            SIPUA_CALL_PAUSED => Self::Paused,
            SIPUA_CALL_END => Self::End,
            SIPUA_CALL_ERROR => Self::Error,
            SIPUA_CALL_RELEASED => Self::Released,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(self) -> c_int {
        match self {
            Self::Idle => SIPUA_CALL_IDLE,
            Self::IncomingReceived => SIPUA_CALL_INCOMING_RECEIVED,
            Self::OutgoingInit => SIPUA_CALL_OUTGOING_INIT,
            Self::OutgoingProgress => SIPUA_CALL_OUTGOING_PROGRESS,
            Self::OutgoingRinging => SIPUA_CALL_OUTGOING_RINGING,
            Self::Connected => SIPUA_CALL_CONNECTED,
            Self::StreamsRunning => SIPUA_CALL_STREAMS_RUNNING,
            Self::Paused => SIPUA_CALL_PAUSED,
            Self::End => SIPUA_CALL_END,
            Self::Error => SIPUA_CALL_ERROR,
            Self::Released => SIPUA_CALL_RELEASED,
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether the call has finished (ended, failed or released).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::End | Self::Error | Self::Released)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "Unknown({})", raw),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values_round_trip() {
        for raw in SIPUA_CALL_IDLE..=SIPUA_CALL_RELEASED {
            let state = CallState::from_raw(raw);
            assert!(!matches!(state, CallState::Unknown(_)));
            assert_eq!(state.as_raw(), raw);
        }
        for raw in SIPUA_GLOBAL_OFF..=SIPUA_GLOBAL_CONFIGURING {
            assert_eq!(GlobalState::from_raw(raw).as_raw(), raw);
        }
    }

    #[test]
    fn test_unknown_values_are_preserved() {
        assert_eq!(CallState::from_raw(99), CallState::Unknown(99));
        assert_eq!(CallState::Unknown(99).as_raw(), 99);
        assert_eq!(GlobalState::from_raw(-1), GlobalState::Unknown(-1));
        assert_eq!(CallState::from_raw(99).to_string(), "Unknown(99)");
        assert_eq!(CallState::StreamsRunning.to_string(), "StreamsRunning");
    }

    #[test]
    fn test_terminal_states() {
        assert!(CallState::End.is_terminal());
        assert!(CallState::Released.is_terminal());
        assert!(!CallState::Connected.is_terminal());
    }
}
