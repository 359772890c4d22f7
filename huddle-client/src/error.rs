use crate::negotiation::SignalingState;
use huddle_core::CodecError;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("failed to send signaling message: {0}")]
    Send(String),

    #[error("signaling channel closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("{op} failed: {reason}")]
    Capability { op: &'static str, reason: String },

    #[error("expected {expected} description, got {actual}")]
    InvalidDescription {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unexpected {message} in signaling state {state}")]
    UnexpectedMessage {
        message: &'static str,
        state: SignalingState,
    },

    #[error("negotiation is closed")]
    Closed,
}

impl NegotiationError {
    pub fn capability(op: &'static str, err: impl Display) -> Self {
        Self::Capability {
            op,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media access denied: {0}")]
    AccessDenied(String),
}

/// Errors surfaced to the application by the session controller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("signaling channel did not open within {0:?}")]
    ConnectTimeout(Duration),

    #[error("media access denied: {0}")]
    MediaAccessDenied(String),

    #[error("negotiation with {peer} failed: {source}")]
    Negotiation {
        peer: String,
        #[source]
        source: NegotiationError,
    },

    #[error("server error: {0}")]
    Server(String),

    #[error("room and username must not be empty")]
    InvalidIdentity,

    #[error("already in room {0}")]
    AlreadyInRoom(String),

    #[error("not in a room")]
    NotInRoom,

    #[error("a call needs at least one other member in the room")]
    NotEnoughParticipants,

    #[error("session event loop has shut down")]
    SessionClosed,
}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::AccessDenied(reason) => SessionError::MediaAccessDenied(reason),
        }
    }
}
