use crate::controller::session_state::SessionSnapshot;
use crate::error::SessionError;
use tokio::sync::oneshot;

/// Application requests to the session loop. The result comes back on `reply`.
#[derive(Debug)]
pub enum SessionCommand {
    /// Join a room; waits for the signaling channel to open.
    Join {
        room: String,
        username: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Leave the room. Safe in any state.
    Leave { reply: oneshot::Sender<()> },

    /// Start a call with every member of the room.
    StartCall {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Hang up. Safe in any state.
    EndCall { reply: oneshot::Sender<()> },

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}
