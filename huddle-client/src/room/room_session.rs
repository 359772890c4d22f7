use crate::config::FailureRecovery;
use crate::controller::SessionObserver;
use crate::error::{NegotiationError, SessionError};
use crate::negotiation::{
    NegotiationContext, NegotiationRole, OfferDisposition, PeerNegotiator, SignalingState,
};
use crate::room::identity::LocalIdentity;
use crate::signaling::SignalingOutput;
use crate::transport::{MediaBackend, MediaHandle, PeerKey, TransportEvent};
use huddle_core::{IceCandidate, SessionDescription, SignalMessage};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Active { initiator: bool },
}

/// Follow-up the room asks of its owner after handling a transport event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomSignal {
    None,
    RejoinRequired,
}

/// Collaborators the room borrows from the session for one handler.
pub struct RoomContext<'a> {
    pub backend: &'a dyn MediaBackend,
    pub output: &'a dyn SignalingOutput,
    pub observer: &'a dyn SessionObserver,
    pub transport_tx: &'a mpsc::UnboundedSender<TransportEvent>,
    pub media: Option<&'a MediaHandle>,
}

impl<'a> RoomContext<'a> {
    fn negotiation<'b>(&'b self, identity: &'b LocalIdentity) -> NegotiationContext<'b> {
        NegotiationContext {
            room: identity.room(),
            local: identity.username(),
            backend: self.backend,
            output: self.output,
            transport_tx: self.transport_tx,
            media: self.media,
        }
    }
}

/// Membership and the negotiators of the current room.
///
/// The server's `room_info` is the only source of membership. Every member
/// always has exactly one negotiator (idle until a call needs it), so the set
/// of live negotiators is the member list minus ourselves.
pub struct RoomSession {
    identity: Option<LocalIdentity>,
    joined: bool,
    members: BTreeSet<String>,
    negotiators: HashMap<String, PeerNegotiator>,
    call: CallState,
    next_negotiation: u64,
    recovery: FailureRecovery,
}

impl RoomSession {
    pub fn new(recovery: FailureRecovery) -> Self {
        Self {
            identity: None,
            joined: false,
            members: BTreeSet::new(),
            negotiators: HashMap::new(),
            call: CallState::Idle,
            next_negotiation: 0,
            recovery,
        }
    }

    pub fn identity(&self) -> Option<&LocalIdentity> {
        self.identity.as_ref()
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn room(&self) -> Option<&str> {
        self.identity.as_ref().map(LocalIdentity::room)
    }

    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(LocalIdentity::username)
    }

    pub fn members(&self) -> &BTreeSet<String> {
        &self.members
    }

    pub fn call_state(&self) -> CallState {
        self.call
    }

    pub fn call_active(&self) -> bool {
        matches!(self.call, CallState::Active { .. })
    }

    pub fn negotiator(&self, remote: &str) -> Option<&PeerNegotiator> {
        self.negotiators.get(remote)
    }

    pub fn negotiators(&self) -> impl Iterator<Item = &PeerNegotiator> {
        self.negotiators.values()
    }

    pub fn live_peers(&self) -> BTreeSet<String> {
        self.negotiators.keys().cloned().collect()
    }

    /// Whether an inbound peer message is addressed to us in our room.
    pub fn accepts(&self, msg: &SignalMessage) -> bool {
        let Some(identity) = self.identity.as_ref().filter(|_| self.joined) else {
            return false;
        };
        if msg.room() != Some(identity.room()) {
            return false;
        }
        if msg.sender() == Some(identity.username()) {
            return false;
        }
        msg.target().is_none_or(|target| target == identity.username())
    }

    /// Start joining `room` as `username`; returns the join message to send.
    ///
    /// Joining the same room under the same typed name again gets a freshly
    /// suffixed username.
    pub fn begin_join(
        &mut self,
        room: &str,
        username: &str,
        create: bool,
    ) -> Result<SignalMessage, SessionError> {
        if let Some(current) = self.identity.as_ref().filter(|_| self.joined) {
            return Err(SessionError::AlreadyInRoom(current.room().to_owned()));
        }

        let reuse = self
            .identity
            .as_ref()
            .is_some_and(|identity| identity.matches(room, username));
        if !reuse {
            self.identity = Some(LocalIdentity::new(room, username)?);
        }

        self.join_message(create).ok_or(SessionError::InvalidIdentity)
    }

    /// Join message for a rejoin of the last room, if there was one.
    pub fn rejoin(&mut self, create: bool) -> Option<SignalMessage> {
        if self.joined {
            return None;
        }
        self.join_message(create)
    }

    pub fn leave_message(&self) -> Option<SignalMessage> {
        let identity = self.identity.as_ref().filter(|_| self.joined)?;
        Some(SignalMessage::Leave {
            room: identity.room().to_owned(),
            username: identity.username().to_owned(),
        })
    }

    fn join_message(&mut self, create: bool) -> Option<SignalMessage> {
        let identity = self.identity.as_mut()?;
        let username = identity.next_join_username().to_owned();
        self.joined = true;
        info!("Joining room {} as {}", identity.room(), username);

        Some(SignalMessage::Join {
            room: identity.room().to_owned(),
            username,
            create,
        })
    }

    /// Apply the server's authoritative member list.
    pub async fn reconcile(&mut self, users: &[String], ctx: &RoomContext<'_>) {
        let Some(local) = self.username().filter(|_| self.joined).map(str::to_owned) else {
            debug!("Ignoring room_info outside of a room");
            return;
        };

        let next: BTreeSet<String> = users
            .iter()
            .filter(|user| **user != local)
            .cloned()
            .collect();
        if next == self.members {
            return;
        }

        let departed: Vec<String> = self.members.difference(&next).cloned().collect();
        let arrived: Vec<String> = next.difference(&self.members).cloned().collect();

        for remote in &departed {
            info!("{} left the room", remote);
            if let Some(mut negotiator) = self.negotiators.remove(remote) {
                negotiator.close().await;
            }
            ctx.observer.on_peer_left(remote).await;
        }

        for remote in &arrived {
            info!("{} joined the room", remote);
            let negotiator = self.fresh_negotiator(remote);
            self.negotiators.insert(remote.clone(), negotiator);
        }

        self.members = next;
        let members: Vec<String> = self.members.iter().cloned().collect();
        ctx.observer.on_members_changed(&members).await;

        if self.call == (CallState::Active { initiator: true }) {
            for remote in &arrived {
                self.start_peer(remote, ctx).await;
            }
        }
    }

    /// Begin a call as initiator: announce it and offer to every member.
    pub async fn start_call(&mut self, ctx: &RoomContext<'_>) -> Result<(), SessionError> {
        let Some(identity) = self.identity.as_ref().filter(|_| self.joined) else {
            return Err(SessionError::NotInRoom);
        };
        if self.members.is_empty() {
            return Err(SessionError::NotEnoughParticipants);
        }

        ctx.output.send(SignalMessage::StartCall {
            room: identity.room().to_owned(),
            username: identity.username().to_owned(),
        });
        self.call = CallState::Active { initiator: true };
        info!("Call started with {} member(s)", self.members.len());

        let idle: Vec<String> = self
            .negotiators
            .values()
            .filter(|n| n.is_idle())
            .map(|n| n.remote().to_owned())
            .collect();
        for remote in idle {
            self.start_peer(&remote, ctx).await;
        }
        Ok(())
    }

    /// Another member announced a call. We answer their offers, we do not offer.
    pub async fn remote_call_started(&mut self, sender: &str, ctx: &RoomContext<'_>) {
        if !self.members.contains(sender) {
            debug!("Ignoring start_call from non-member {}", sender);
            return;
        }
        if self.call == CallState::Idle {
            self.call = CallState::Active { initiator: false };
        }
        info!("{} started a call", sender);
        ctx.observer.on_call_started(sender).await;
    }

    /// End the call locally: every negotiation is closed and replaced with an idle one.
    pub async fn end_call(&mut self, ctx: &RoomContext<'_>) -> bool {
        if !self.call_active() && self.negotiators.values().all(PeerNegotiator::is_idle) {
            return false;
        }

        if let Some(identity) = self.identity.as_ref().filter(|_| self.joined) {
            ctx.output.send(SignalMessage::EndCall {
                room: identity.room().to_owned(),
                username: identity.username().to_owned(),
            });
        }

        let remotes: Vec<String> = self.negotiators.keys().cloned().collect();
        for remote in remotes {
            if self.reset_peer(&remote).await {
                ctx.observer.on_call_ended(&remote).await;
            }
        }
        self.call = CallState::Idle;
        info!("Call ended");
        true
    }

    /// A member hung up: only their negotiation is reset.
    pub async fn remote_call_ended(&mut self, sender: &str, ctx: &RoomContext<'_>) {
        if !self.members.contains(sender) {
            return;
        }

        info!("{} ended the call", sender);
        self.reset_peer(sender).await;
        ctx.observer.on_call_ended(sender).await;

        if self.negotiators.values().all(PeerNegotiator::is_idle) {
            self.call = CallState::Idle;
        }
    }

    pub async fn handle_offer(
        &mut self,
        sender: &str,
        sdp: SessionDescription,
        ctx: &RoomContext<'_>,
    ) {
        let Some(identity) = self.identity.as_ref() else {
            return;
        };
        let Some(negotiator) = self.negotiators.get(sender) else {
            warn!("Dropping offer from non-member {}", sender);
            return;
        };

        match negotiator.classify_offer(identity.username()) {
            OfferDisposition::Accept => {}
            OfferDisposition::Ignore => {
                info!("Glare with {}: keeping our offer", sender);
                if let Some(negotiator) = self.negotiators.get_mut(sender) {
                    negotiator.discard_until_answer();
                }
                return;
            }
            OfferDisposition::Yield => {
                info!(
                    "Offer from {} while {}: answering with a fresh negotiation",
                    sender,
                    negotiator.state()
                );
                self.yield_peer(sender).await;
            }
        }

        if self.call == CallState::Idle {
            self.call = CallState::Active { initiator: false };
        }

        let result = match (self.identity.as_ref(), self.negotiators.get_mut(sender)) {
            (Some(identity), Some(negotiator)) => {
                negotiator
                    .accept_offer(sdp, &ctx.negotiation(identity))
                    .await
            }
            _ => return,
        };
        if let Err(e) = result {
            self.fail_peer(sender, e, ctx).await;
        }
    }

    pub async fn handle_answer(
        &mut self,
        sender: &str,
        sdp: SessionDescription,
        ctx: &RoomContext<'_>,
    ) {
        let Some(negotiator) = self.negotiators.get_mut(sender) else {
            warn!("Dropping answer from non-member {}", sender);
            return;
        };
        if negotiator.state() != SignalingState::HaveLocalOffer {
            warn!(
                "Dropping stale answer from {} in {}",
                sender,
                negotiator.state()
            );
            return;
        }

        if let Err(e) = negotiator.accept_answer(sdp).await {
            self.fail_peer(sender, e, ctx).await;
        }
    }

    pub async fn handle_candidate(
        &mut self,
        sender: &str,
        candidate: IceCandidate,
        ctx: &RoomContext<'_>,
    ) {
        let Some(negotiator) = self.negotiators.get_mut(sender) else {
            debug!("Dropping candidate from non-member {}", sender);
            return;
        };

        if let Err(e) = negotiator.add_remote_candidate(candidate).await {
            self.fail_peer(sender, e, ctx).await;
        }
    }

    /// Route an event from a peer connection. Events from replaced
    /// negotiations are discarded.
    pub async fn handle_transport_event(
        &mut self,
        event: TransportEvent,
        ctx: &RoomContext<'_>,
    ) -> RoomSignal {
        let key = event.key().clone();
        let current = self
            .negotiators
            .get(&key.remote)
            .is_some_and(|n| *n.key() == key);
        if !current {
            debug!("Discarding event from stale negotiation {}", key);
            return RoomSignal::None;
        }
        let Some(identity) = self.identity.as_ref() else {
            return RoomSignal::None;
        };

        match event {
            TransportEvent::CandidateGenerated(_, candidate) => {
                if let Some(negotiator) = self.negotiators.get(&key.remote) {
                    negotiator.forward_local_candidate(candidate, &ctx.negotiation(identity));
                }
                RoomSignal::None
            }

            TransportEvent::RemoteTrack(_, track) => {
                info!("Remote {:?} track {} from {}", track.kind, track.id, key);
                ctx.observer.on_remote_track(&key.remote, &track).await;
                RoomSignal::None
            }

            TransportEvent::NegotiationNeeded(_) => {
                let result = match self.negotiators.get_mut(&key.remote) {
                    Some(negotiator) => negotiator.renegotiate(&ctx.negotiation(identity)).await,
                    None => Ok(false),
                };
                if let Err(e) = result {
                    self.fail_peer(&key.remote, e, ctx).await;
                }
                RoomSignal::None
            }

            TransportEvent::Disconnected(_, reason) => {
                warn!("Peer connection {} lost: {}", key, reason);
                match self.recovery {
                    FailureRecovery::RejoinRoom => RoomSignal::RejoinRequired,
                    FailureRecovery::RenegotiatePeer => {
                        let was_offerer = self
                            .negotiators
                            .get(&key.remote)
                            .is_some_and(|n| n.role() == NegotiationRole::Offerer);
                        if self.reset_peer(&key.remote).await {
                            ctx.observer.on_call_ended(&key.remote).await;
                        }
                        if was_offerer && self.call_active() {
                            self.start_peer(&key.remote, ctx).await;
                        }
                        RoomSignal::None
                    }
                }
            }
        }
    }

    /// Close every negotiation and forget the membership. The identity is
    /// kept so a later rejoin can derive its username from it.
    pub async fn teardown(&mut self, ctx: &RoomContext<'_>) {
        let had_members = !self.members.is_empty();

        let mut remotes: Vec<String> = self.negotiators.keys().cloned().collect();
        remotes.sort();
        for remote in remotes {
            let Some(mut negotiator) = self.negotiators.remove(&remote) else {
                continue;
            };
            let was_active = !negotiator.is_idle();
            negotiator.close().await;
            debug!("Closed negotiation with {}", remote);
            if was_active {
                ctx.observer.on_call_ended(&remote).await;
            }
        }
        self.members.clear();
        self.call = CallState::Idle;
        self.joined = false;

        if had_members {
            ctx.observer.on_members_changed(&[]).await;
        }
    }

    async fn start_peer(&mut self, remote: &str, ctx: &RoomContext<'_>) {
        let result = match (self.identity.as_ref(), self.negotiators.get_mut(remote)) {
            (Some(identity), Some(negotiator)) => negotiator.start(&ctx.negotiation(identity)).await,
            _ => return,
        };
        if let Err(e) = result {
            self.fail_peer(remote, e, ctx).await;
        }
    }

    /// Isolate a faulty negotiation: close it, replace it with an idle one
    /// and report the failure. The rest of the room is unaffected.
    async fn fail_peer(&mut self, remote: &str, error: NegotiationError, ctx: &RoomContext<'_>) {
        warn!("Negotiation with {} failed: {}", remote, error);
        if self.reset_peer(remote).await {
            ctx.observer.on_call_ended(remote).await;
        }
        ctx.observer
            .on_error(&SessionError::Negotiation {
                peer: remote.to_owned(),
                source: error,
            })
            .await;
    }

    /// Replace the negotiator for `remote` with a fresh idle one. Returns
    /// whether the old one had progressed past idle.
    async fn reset_peer(&mut self, remote: &str) -> bool {
        let Some(mut old) = self.negotiators.remove(remote) else {
            return false;
        };
        let was_active = !old.is_idle();
        old.close().await;

        let fresh = self.fresh_negotiator(remote);
        self.negotiators.insert(remote.to_owned(), fresh);
        was_active
    }

    /// Glare lost or the remote restarted: answer with a new instance,
    /// keeping candidates that were already buffered for the remote offer.
    async fn yield_peer(&mut self, remote: &str) {
        let Some(mut old) = self.negotiators.remove(remote) else {
            return;
        };
        let pending = old.take_pending();
        old.close().await;

        let mut fresh = self.fresh_negotiator(remote);
        fresh.buffer_candidates(pending);
        self.negotiators.insert(remote.to_owned(), fresh);
    }

    fn fresh_negotiator(&mut self, remote: &str) -> PeerNegotiator {
        self.next_negotiation += 1;
        PeerNegotiator::new(PeerKey::new(remote, self.next_negotiation))
    }
}
