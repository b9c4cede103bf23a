//! Connection state machine.
//!
//! ```text
//!                 next_state == 1
//! Handshaking ─────────────────────▶ Status ──▶ Closed
//!      │          otherwise
//!      └───────────────────────────▶ Login ───▶ Play ──▶ Closed
//!                                      login start
//! ```
//!
//! The state selects which packet-id table decodes incoming frames. `Closed`
//! is terminal and has no table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Handshaking,
    Status,
    Login,
    Play,
    Closed,
}

impl ConnectionState {
    /// Wire id of the state, as sent in the handshake's next-state field.
    pub fn id(self) -> i32 {
        match self {
            ConnectionState::Handshaking => 0,
            ConnectionState::Status => 1,
            ConnectionState::Login => 2,
            ConnectionState::Play => 3,
            ConnectionState::Closed => -1,
        }
    }

    /// State requested by a handshake. `1` selects status; any other value selects login.
    pub fn after_handshake(next_state: i32) -> Self {
        if next_state == 1 {
            ConnectionState::Status
        } else {
            ConnectionState::Login
        }
    }

    /// Whether a packet-id table exists for this state.
    pub fn accepts_packets(self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Checks a transition against the state machine.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState> {
        use ConnectionState::*;
        match (self, next) {
            (Handshaking, Status) | (Handshaking, Login) | (Login, Play) => Ok(next),
            (_, Closed) => Ok(Closed),
            (from, _) => Err(ProtocolError::InvalidState(from.id())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Status => "status",
            ConnectionState::Login => "login",
            ConnectionState::Play => "play",
            ConnectionState::Closed => "closed",
        }
    }
}

impl TryFrom<i32> for ConnectionState {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ConnectionState::Handshaking),
            1 => Ok(ConnectionState::Status),
            2 => Ok(ConnectionState::Login),
            3 => Ok(ConnectionState::Play),
            other => Err(ProtocolError::InvalidState(other)),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_selects_next_state() {
        assert_eq!(ConnectionState::after_handshake(1), ConnectionState::Status);
        assert_eq!(ConnectionState::after_handshake(2), ConnectionState::Login);
        assert_eq!(ConnectionState::after_handshake(99), ConnectionState::Login);
        assert_eq!(ConnectionState::after_handshake(-4), ConnectionState::Login);
    }

    #[test]
    fn test_valid_transitions() {
        use ConnectionState::*;
        assert_eq!(Handshaking.transition(Status).ok(), Some(Status));
        assert_eq!(Handshaking.transition(Login).ok(), Some(Login));
        assert_eq!(Login.transition(Play).ok(), Some(Play));
        assert_eq!(Play.transition(Closed).ok(), Some(Closed));
    }

    #[test]
    fn test_invalid_transitions() {
        use ConnectionState::*;
        assert!(matches!(
            Status.transition(Play),
            Err(ProtocolError::InvalidState(1))
        ));
        assert!(Play.transition(Login).is_err());
        assert!(Closed.transition(Play).is_err());
        assert!(Handshaking.transition(Play).is_err());
    }

    #[test]
    fn test_state_ids() {
        for state in [
            ConnectionState::Handshaking,
            ConnectionState::Status,
            ConnectionState::Login,
            ConnectionState::Play,
        ] {
            assert_eq!(ConnectionState::try_from(state.id()).ok(), Some(state));
        }
        assert!(matches!(
            ConnectionState::try_from(7),
            Err(ProtocolError::InvalidState(7))
        ));
    }
}
