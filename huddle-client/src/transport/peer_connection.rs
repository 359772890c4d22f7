use crate::error::{MediaError, NegotiationError};
use crate::transport::media::{MediaConstraints, MediaHandle};
use crate::transport::transport_event::{PeerKey, TransportEvent};
use async_trait::async_trait;
use huddle_core::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;

/// Negotiation capabilities of one peer connection.
///
/// Implementations report asynchronous happenings (gathered candidates,
/// remote tracks, failures) as [`TransportEvent`]s on the sender they were
/// created with, never by calling back into the session.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_tracks(&self, media: &MediaHandle) -> Result<(), NegotiationError>;

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;

    async fn set_remote_description(&self, desc: SessionDescription)
    -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    async fn close(&self) -> Result<(), NegotiationError>;
}

/// Media capture and peer connection factory.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn create_local_capture(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaHandle, MediaError>;

    async fn create_peer_connection(
        &self,
        key: PeerKey,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PeerConnection>, NegotiationError>;
}
