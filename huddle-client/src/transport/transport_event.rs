use crate::transport::media::RemoteTrack;
use huddle_core::IceCandidate;
use std::fmt;

/// Identifies one negotiation instance with one remote member. A fresh
/// instance for the same member gets a new `negotiation` number, so events
/// from a torn-down peer connection can be told apart and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub remote: String,
    pub negotiation: u64,
}

impl PeerKey {
    pub fn new(remote: impl Into<String>, negotiation: u64) -> Self {
        Self {
            remote: remote.into(),
            negotiation,
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.remote, self.negotiation)
    }
}

/// Events a peer connection produces for the session loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered and must be signaled to the remote.
    CandidateGenerated(PeerKey, IceCandidate),

    /// The remote side started sending a media track.
    RemoteTrack(PeerKey, RemoteTrack),

    /// Local tracks changed after the connection became stable.
    NegotiationNeeded(PeerKey),

    /// The peer connection reported a disconnected or failed state.
    Disconnected(PeerKey, String),
}

impl TransportEvent {
    pub fn key(&self) -> &PeerKey {
        match self {
            TransportEvent::CandidateGenerated(key, _)
            | TransportEvent::RemoteTrack(key, _)
            | TransportEvent::NegotiationNeeded(key)
            | TransportEvent::Disconnected(key, _) => key,
        }
    }
}
