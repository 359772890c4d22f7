use crate::controller::session_state::ConnectionState;
use crate::error::SessionError;
use crate::transport::RemoteTrack;
use async_trait::async_trait;

/// Application callbacks. Every method defaults to doing nothing.
///
/// Called from the session loop, one at a time; a slow observer delays the
/// next event.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn on_state_changed(&self, _state: ConnectionState) {}

    /// The room's member list, without ourselves.
    async fn on_members_changed(&self, _members: &[String]) {}

    /// Another member announced a call.
    async fn on_call_started(&self, _initiator: &str) {}

    async fn on_remote_track(&self, _peer: &str, _track: &RemoteTrack) {}

    /// `peer` left the room; release anything rendering their media.
    async fn on_peer_left(&self, _peer: &str) {}

    /// The call with `peer` is over, the member stays in the room.
    async fn on_call_ended(&self, _peer: &str) {}

    async fn on_error(&self, _error: &SessionError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
