use crate::negotiation::SignalingState;
use crate::room::CallState;
use std::fmt;

/// Connection lifecycle of the session. Moves forward only; a failure or a
/// leave resets it to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    InRoom,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::InRoom => "in room",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the session, for status displays and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub room: Option<String>,
    pub username: Option<String>,
    pub members: Vec<String>,
    pub call: CallState,
    pub negotiations: Vec<(String, SignalingState)>,
    pub has_local_media: bool,
}
