use crate::error::NegotiationError;
use crate::negotiation::glare::local_wins;
use crate::negotiation::ice_buffer::IceCandidateBuffer;
use crate::signaling::SignalingOutput;
use crate::transport::{MediaBackend, MediaHandle, PeerConnection, PeerKey, TransportEvent};
use huddle_core::{IceCandidate, SdpKind, SessionDescription, SignalMessage};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Unset,
    Offerer,
    Answerer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Idle,
    HaveLocalOffer,
    HaveRemoteOffer,
    Stable,
    Closed,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalingState::Idle => "idle",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::Stable => "stable",
            SignalingState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What to do with an inbound offer, given the negotiator's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferDisposition {
    /// Answer it with this negotiator.
    Accept,
    /// Glare won: keep our own offer and drop the remote one.
    Ignore,
    /// Discard this negotiator and answer with a fresh one.
    Yield,
}

/// Everything a negotiator needs from its surroundings for one transition.
pub struct NegotiationContext<'a> {
    pub room: &'a str,
    pub local: &'a str,
    pub backend: &'a dyn MediaBackend,
    pub output: &'a dyn SignalingOutput,
    pub transport_tx: &'a mpsc::UnboundedSender<TransportEvent>,
    pub media: Option<&'a MediaHandle>,
}

/// Offer/answer state machine for one remote member.
///
/// The peer connection is created lazily on the first transition that needs
/// it. An instance never leaves `Closed`; renegotiating with the same member
/// after a close means building a new negotiator with a new [`PeerKey`].
pub struct PeerNegotiator {
    key: PeerKey,
    role: NegotiationRole,
    state: SignalingState,
    connection: Option<Box<dyn PeerConnection>>,
    pending: IceCandidateBuffer,
    remote_description_set: bool,
    /// Set after winning glare: candidates still in flight belong to the
    /// connection the remote side is discarding.
    discard_until_answer: bool,
    media: Option<MediaHandle>,
}

impl PeerNegotiator {
    pub fn new(key: PeerKey) -> Self {
        Self {
            key,
            role: NegotiationRole::Unset,
            state: SignalingState::Idle,
            connection: None,
            pending: IceCandidateBuffer::new(),
            remote_description_set: false,
            discard_until_answer: false,
            media: None,
        }
    }

    pub fn key(&self) -> &PeerKey {
        &self.key
    }

    pub fn remote(&self) -> &str {
        &self.key.remote
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SignalingState::Idle
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    /// Hand over buffered candidates, e.g. to the negotiator replacing this one.
    pub fn take_pending(&mut self) -> Vec<IceCandidate> {
        self.pending.drain().collect()
    }

    pub fn buffer_candidates(&mut self, candidates: impl IntoIterator<Item = IceCandidate>) {
        for candidate in candidates {
            self.pending.push(candidate);
        }
    }

    /// Glare won: drop what the remote trickled for its own offer, and
    /// everything else it sends until its answer arrives.
    pub fn discard_until_answer(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();
        self.discard_until_answer = true;
        debug!(
            "Discarding candidates from {} until its answer ({} dropped)",
            self.key, dropped
        );
    }

    pub fn classify_offer(&self, local: &str) -> OfferDisposition {
        match (self.state, self.role) {
            (SignalingState::Idle, _) => OfferDisposition::Accept,
            (SignalingState::Stable, NegotiationRole::Answerer) => OfferDisposition::Accept,
            (SignalingState::HaveLocalOffer, _) if local_wins(local, self.remote()) => {
                OfferDisposition::Ignore
            }
            _ => OfferDisposition::Yield,
        }
    }

    /// Local side initiates: offer to the remote member.
    pub async fn start(&mut self, ctx: &NegotiationContext<'_>) -> Result<(), NegotiationError> {
        match (self.state, self.role) {
            (SignalingState::Idle, _) | (SignalingState::Stable, NegotiationRole::Offerer) => {}
            (state, _) => {
                return Err(NegotiationError::UnexpectedMessage {
                    message: "start",
                    state,
                });
            }
        }

        self.ensure_connection(ctx).await?;
        self.attach_media(ctx).await?;

        let pc = self.connection()?;
        let offer = pc.create_offer().await?;
        pc.set_local_description(offer.clone()).await?;

        self.role = NegotiationRole::Offerer;
        self.transition(SignalingState::HaveLocalOffer);

        ctx.output.send(SignalMessage::Offer {
            sdp: offer,
            room: ctx.room.to_owned(),
            username: ctx.local.to_owned(),
            target: Some(self.key.remote.clone()),
        });
        Ok(())
    }

    /// Answer a remote offer.
    pub async fn accept_offer(
        &mut self,
        sdp: SessionDescription,
        ctx: &NegotiationContext<'_>,
    ) -> Result<(), NegotiationError> {
        expect_kind(&sdp, SdpKind::Offer)?;
        match (self.state, self.role) {
            (SignalingState::Idle, _) | (SignalingState::Stable, NegotiationRole::Answerer) => {}
            (state, _) => {
                return Err(NegotiationError::UnexpectedMessage {
                    message: "offer",
                    state,
                });
            }
        }

        self.ensure_connection(ctx).await?;
        self.connection()?.set_remote_description(sdp).await?;

        self.remote_description_set = true;
        self.role = NegotiationRole::Answerer;
        self.transition(SignalingState::HaveRemoteOffer);
        self.flush_pending().await?;

        self.attach_media(ctx).await?;

        let pc = self.connection()?;
        let answer = pc.create_answer().await?;
        pc.set_local_description(answer.clone()).await?;

        self.transition(SignalingState::Stable);

        ctx.output.send(SignalMessage::Answer {
            sdp: answer,
            room: ctx.room.to_owned(),
            username: ctx.local.to_owned(),
            target: Some(self.key.remote.clone()),
        });
        Ok(())
    }

    pub async fn accept_answer(&mut self, sdp: SessionDescription) -> Result<(), NegotiationError> {
        expect_kind(&sdp, SdpKind::Answer)?;
        if self.state != SignalingState::HaveLocalOffer {
            return Err(NegotiationError::UnexpectedMessage {
                message: "answer",
                state: self.state,
            });
        }

        self.connection()?.set_remote_description(sdp).await?;
        self.remote_description_set = true;
        self.discard_until_answer = false;
        self.transition(SignalingState::Stable);
        self.flush_pending().await
    }

    /// Apply a remote candidate now, or hold it until the remote description is set.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        if self.state == SignalingState::Closed {
            debug!("Dropping candidate for closed negotiation {}", self.key);
            return Ok(());
        }

        if self.discard_until_answer {
            debug!("Dropping candidate from {} until its answer", self.key);
            return Ok(());
        }

        if !self.remote_description_set {
            self.pending.push(candidate);
            debug!(
                "Buffered candidate for {} ({} pending)",
                self.key,
                self.pending.len()
            );
            return Ok(());
        }

        self.connection()?.add_ice_candidate(candidate).await
    }

    pub fn forward_local_candidate(&self, candidate: IceCandidate, ctx: &NegotiationContext<'_>) {
        if self.state == SignalingState::Closed {
            return;
        }
        ctx.output.send(SignalMessage::IceCandidate {
            ice: candidate,
            room: ctx.room.to_owned(),
            username: ctx.local.to_owned(),
            target: Some(self.key.remote.clone()),
        });
    }

    /// Re-run the offer when local tracks changed. Only the offerer does this.
    pub async fn renegotiate(&mut self, ctx: &NegotiationContext<'_>) -> Result<bool, NegotiationError> {
        if self.role != NegotiationRole::Offerer || self.state != SignalingState::Stable {
            debug!(
                "Not renegotiating {} as {:?} in {}",
                self.key, self.role, self.state
            );
            return Ok(false);
        }

        info!("Renegotiating with {}", self.key);
        self.start(ctx).await?;
        Ok(true)
    }

    /// Tear down the peer connection. Idempotent.
    pub async fn close(&mut self) {
        if self.state == SignalingState::Closed {
            return;
        }

        self.transition(SignalingState::Closed);
        self.pending.clear();
        self.media = None;

        let Some(pc) = self.connection.take() else {
            return;
        };
        if let Err(e) = pc.close().await {
            warn!("Failed to close peer connection {}: {}", self.key, e);
        }
    }

    async fn ensure_connection(&mut self, ctx: &NegotiationContext<'_>) -> Result<(), NegotiationError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let pc = ctx
            .backend
            .create_peer_connection(self.key.clone(), ctx.transport_tx.clone())
            .await?;
        self.connection = Some(pc);
        Ok(())
    }

    async fn attach_media(&mut self, ctx: &NegotiationContext<'_>) -> Result<(), NegotiationError> {
        if self.media.is_some() {
            return Ok(());
        }
        let Some(media) = ctx.media else {
            debug!("No local media for {}, negotiating receive-only", self.key);
            return Ok(());
        };

        self.connection()?.add_tracks(media).await?;
        self.media = Some(media.clone());
        Ok(())
    }

    async fn flush_pending(&mut self) -> Result<(), NegotiationError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let pc = self
            .connection
            .as_deref()
            .ok_or(NegotiationError::Closed)?;
        let count = self.pending.len();
        for candidate in self.pending.drain() {
            pc.add_ice_candidate(candidate).await?;
        }
        debug!("Flushed {} buffered candidate(s) for {}", count, self.key);
        Ok(())
    }

    fn connection(&self) -> Result<&dyn PeerConnection, NegotiationError> {
        self.connection.as_deref().ok_or(NegotiationError::Closed)
    }

    fn transition(&mut self, next: SignalingState) {
        debug!("Negotiation {}: {} -> {}", self.key, self.state, next);
        self.state = next;
    }
}

fn expect_kind(sdp: &SessionDescription, expected: SdpKind) -> Result<(), NegotiationError> {
    if sdp.kind == expected {
        return Ok(());
    }
    Err(NegotiationError::InvalidDescription {
        expected: expected.as_str(),
        actual: sdp.kind.as_str(),
    })
}
