use crate::config::SessionConfig;
use crate::controller::session_command::SessionCommand;
use crate::controller::session_handle::SessionHandle;
use crate::controller::session_observer::SessionObserver;
use crate::controller::session_state::{ConnectionState, SessionSnapshot};
use crate::error::{SessionError, TransportError};
use crate::room::{LocalIdentity, RoomContext, RoomSession, RoomSignal};
use crate::signaling::{ChannelEvent, ChannelSignal, Connector, SignalingChannel, SignalingOutput};
use crate::transport::{MediaBackend, MediaHandle, TransportEvent};
use huddle_core::SignalMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One entry of the session's inbound queue.
#[derive(Debug)]
pub enum SessionEvent {
    Channel(ChannelEvent),
    Transport(TransportEvent),
}

/// Collaborators shared by every handler of the session loop.
struct SessionIo {
    channel: SignalingChannel,
    backend: Arc<dyn MediaBackend>,
    observer: Arc<dyn SessionObserver>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    media: Option<MediaHandle>,
}

impl SessionIo {
    fn room_ctx(&self) -> RoomContext<'_> {
        RoomContext {
            backend: self.backend.as_ref(),
            output: &self.channel,
            observer: self.observer.as_ref(),
            transport_tx: &self.transport_tx,
            media: self.media.as_ref(),
        }
    }
}

/// Top-level orchestrator: owns the signaling channel and the room session
/// and processes commands and events strictly one at a time.
pub struct SessionController {
    config: SessionConfig,
    state: ConnectionState,
    room: RoomSession,
    io: SessionIo,
    /// Set by a successful join, cleared by an explicit leave or by giving
    /// up on reconnecting. Gates every automatic reconnect.
    wants_room: bool,
    channel_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        backend: Arc<dyn MediaBackend>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        let channel = SignalingChannel::new(
            config.endpoint.clone(),
            connector,
            config.reconnect.clone(),
            config.normal_close_code,
            channel_tx,
        );

        Self {
            room: RoomSession::new(config.failure_recovery),
            config,
            state: ConnectionState::Disconnected,
            io: SessionIo {
                channel,
                backend,
                observer,
                transport_tx,
                media: None,
            },
            wants_room: false,
            channel_rx,
            transport_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn room(&self) -> &RoomSession {
        &self.room
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.io.channel
    }

    pub fn local_media(&self) -> Option<&MediaHandle> {
        self.io.media.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut negotiations: Vec<_> = self
            .room
            .negotiators()
            .map(|n| (n.remote().to_owned(), n.state()))
            .collect();
        negotiations.sort_by(|a, b| a.0.cmp(&b.0));

        SessionSnapshot {
            state: self.state,
            room: self.room.room().filter(|_| self.room.is_joined()).map(str::to_owned),
            username: self.room.username().map(str::to_owned),
            members: self.room.members().iter().cloned().collect(),
            call: self.room.call_state(),
            negotiations,
            has_local_media: self.io.media.is_some(),
        }
    }

    /// Join `room` as `username`, opening the signaling channel first if needed.
    pub async fn join_room(&mut self, room: &str, username: &str) -> Result<(), SessionError> {
        if self.room.is_joined() {
            let current = self.room.room().unwrap_or(room).to_owned();
            return Err(SessionError::AlreadyInRoom(current));
        }
        LocalIdentity::validate(room, username)?;

        self.ensure_open().await?;

        let join = self.room.begin_join(room, username, self.config.create_room)?;
        self.io.channel.send(join);
        self.io.channel.reset_backoff();
        self.wants_room = true;
        self.set_state(ConnectionState::InRoom).await;
        Ok(())
    }

    /// Leave the room and close everything. Safe to call in any state.
    pub async fn leave_room(&mut self) {
        self.wants_room = false;
        self.io.channel.cancel_reconnect();

        if let Some(leave) = self.room.leave_message() {
            info!("Leaving room");
            self.io.channel.send(leave);
        }
        self.room.teardown(&self.io.room_ctx()).await;
        self.release_media();
        self.io.channel.disconnect("leave");
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Capture local media and offer to every member.
    pub async fn start_call(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::InRoom || !self.room.is_joined() {
            return Err(SessionError::NotInRoom);
        }
        if self.room.members().is_empty() {
            return Err(SessionError::NotEnoughParticipants);
        }
        if self.room.call_active() {
            debug!("Call already active");
            return Ok(());
        }

        self.ensure_media().await?;
        self.room.start_call(&self.io.room_ctx()).await
    }

    /// Hang up every negotiation and release local media. Safe to call in any state.
    pub async fn end_call(&mut self) {
        self.room.end_call(&self.io.room_ctx()).await;
        self.release_media();
    }

    /// Wait for the next inbound event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            Some(event) = self.channel_rx.recv() => Some(SessionEvent::Channel(event)),
            Some(event) = self.transport_rx.recv() => Some(SessionEvent::Transport(event)),
            else => None,
        }
    }

    /// Handle one event to completion.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Channel(event) => {
                let signal = self.io.channel.on_event(event);
                self.handle_channel_signal(signal).await;
            }
            SessionEvent::Transport(event) => {
                let signal = self.room.handle_transport_event(event, &self.io.room_ctx()).await;
                if signal == RoomSignal::RejoinRequired {
                    self.rejoin_room().await;
                }
            }
        }
    }

    /// Wait for one event and handle it.
    pub async fn step(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    /// Handle every event that is already queued. Returns how many there were.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = if let Ok(event) = self.channel_rx.try_recv() {
                SessionEvent::Channel(event)
            } else if let Ok(event) = self.transport_rx.try_recv() {
                SessionEvent::Transport(event)
            } else {
                return handled;
            };
            self.handle_event(event).await;
            handled += 1;
        }
    }

    pub async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Join {
                room,
                username,
                reply,
            } => {
                let result = self.join_room(&room, &username).await;
                let _ = reply.send(result);
            }
            SessionCommand::Leave { reply } => {
                self.leave_room().await;
                let _ = reply.send(());
            }
            SessionCommand::StartCall { reply } => {
                let result = self.start_call().await;
                let _ = reply.send(result);
            }
            SessionCommand::EndCall { reply } => {
                self.end_call().await;
                let _ = reply.send(());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("Session event loop started");

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down session.");
                            self.leave_room().await;
                            break;
                        }
                    }
                }

                Some(event) = self.channel_rx.recv() => {
                    self.handle_event(SessionEvent::Channel(event)).await;
                }

                Some(event) = self.transport_rx.recv() => {
                    self.handle_event(SessionEvent::Transport(event)).await;
                }
            }
        }

        info!("Session event loop finished");
    }

    /// Run the session on its own task.
    pub fn spawn(self) -> SessionHandle {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(self.run(rx));
        SessionHandle::new(tx)
    }

    async fn handle_channel_signal(&mut self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Message(msg) => self.handle_message(msg).await,
            ChannelSignal::Closed {
                code,
                reason,
                abnormal,
            } => self.on_transport_lost(code, reason, abnormal).await,
            ChannelSignal::ReconnectDue(attempt) => self.try_reconnect(attempt).await,
            ChannelSignal::Ignored => {}
        }
    }

    async fn handle_message(&mut self, msg: SignalMessage) {
        match msg {
            SignalMessage::RoomInfo { data } => {
                self.room.reconcile(&data.users, &self.io.room_ctx()).await;
            }

            SignalMessage::Error { data } => {
                warn!("Server error: {}", data);
                self.io.observer.on_error(&SessionError::Server(data)).await;
            }

            msg if !self.room.accepts(&msg) => {
                debug!("Dropping {} not addressed to us", msg.kind());
            }

            SignalMessage::StartCall { username, .. } => {
                if self.room.members().contains(&username)
                    && let Err(e) = self.ensure_media().await
                {
                    warn!("Cannot join call from {}: {}", username, e);
                    self.io.observer.on_error(&e).await;
                }
                self.room
                    .remote_call_started(&username, &self.io.room_ctx())
                    .await;
            }

            SignalMessage::Offer { sdp, username, .. } => {
                if self.room.members().contains(&username)
                    && let Err(e) = self.ensure_media().await
                {
                    warn!("Answering {} without local media: {}", username, e);
                    self.io.observer.on_error(&e).await;
                }
                self.room
                    .handle_offer(&username, sdp, &self.io.room_ctx())
                    .await;
            }

            SignalMessage::Answer { sdp, username, .. } => {
                self.room
                    .handle_answer(&username, sdp, &self.io.room_ctx())
                    .await;
            }

            SignalMessage::IceCandidate { ice, username, .. } => {
                self.room
                    .handle_candidate(&username, ice, &self.io.room_ctx())
                    .await;
            }

            SignalMessage::EndCall { username, .. } => {
                self.room
                    .remote_call_ended(&username, &self.io.room_ctx())
                    .await;
                if !self.room.call_active() {
                    self.release_media();
                }
            }

            SignalMessage::Join { .. } | SignalMessage::Leave { .. } => {
                debug!("Ignoring join/leave relayed by the server");
            }
        }
    }

    async fn on_transport_lost(&mut self, code: u16, reason: String, abnormal: bool) {
        self.room.teardown(&self.io.room_ctx()).await;
        self.release_media();
        self.set_state(ConnectionState::Disconnected).await;

        if !self.wants_room {
            return;
        }
        if abnormal && self.io.channel.schedule_reconnect() {
            return;
        }

        self.wants_room = false;
        self.io
            .observer
            .on_error(&SessionError::Transport(TransportError::Closed { code, reason }))
            .await;
    }

    async fn try_reconnect(&mut self, attempt: u32) {
        if !self.wants_room {
            return;
        }

        info!("Reconnecting (attempt {})", attempt);
        match self.ensure_open().await {
            Ok(()) => self.send_rejoin().await,
            Err(e) => {
                warn!("Reconnect attempt {} failed: {}", attempt, e);
                if !self.io.channel.schedule_reconnect() {
                    self.wants_room = false;
                    self.io.observer.on_error(&e).await;
                }
            }
        }
    }

    /// Full teardown and rejoin after a peer connection failed.
    async fn rejoin_room(&mut self) {
        if !self.wants_room {
            return;
        }

        info!("Rejoining room after peer connection failure");
        if let Some(leave) = self.room.leave_message() {
            self.io.channel.send(leave);
        }
        self.room.teardown(&self.io.room_ctx()).await;
        self.release_media();
        self.io.channel.disconnect("rejoin");
        self.set_state(ConnectionState::Disconnected).await;

        match self.ensure_open().await {
            Ok(()) => self.send_rejoin().await,
            Err(e) => {
                warn!("Rejoin failed: {}", e);
                if !self.io.channel.schedule_reconnect() {
                    self.wants_room = false;
                    self.io.observer.on_error(&e).await;
                }
            }
        }
    }

    async fn send_rejoin(&mut self) {
        let Some(join) = self.room.rejoin(self.config.create_room) else {
            return;
        };
        self.io.channel.send(join);
        self.io.channel.reset_backoff();
        self.set_state(ConnectionState::InRoom).await;
    }

    /// Open the channel if it is not open, bounded by the connect timeout.
    async fn ensure_open(&mut self) -> Result<(), SessionError> {
        if self.io.channel.is_open() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting).await;
        let limit = self.config.connect_timeout;
        match tokio::time::timeout(limit, self.io.channel.open()).await {
            Ok(Ok(())) => {
                self.set_state(ConnectionState::Connected).await;
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Failed to open signaling channel: {}", e);
                self.set_state(ConnectionState::Disconnected).await;
                Err(e.into())
            }
            Err(_) => {
                warn!("Signaling channel did not open within {:?}", limit);
                self.set_state(ConnectionState::Disconnected).await;
                Err(SessionError::ConnectTimeout(limit))
            }
        }
    }

    async fn ensure_media(&mut self) -> Result<(), SessionError> {
        if self.io.media.is_some() {
            return Ok(());
        }

        let media = self
            .io
            .backend
            .create_local_capture(self.config.media)
            .await?;
        info!("Local media {} acquired", media.stream_id());
        self.io.media = Some(media);
        Ok(())
    }

    /// Drop local media. Negotiators are closed first, so nothing else holds it.
    fn release_media(&mut self) {
        let Some(media) = self.io.media.take() else {
            return;
        };
        let holders = media.holders();
        if holders > 1 {
            warn!(
                "Releasing local media {} still held by {} negotiation(s)",
                media.stream_id(),
                holders - 1
            );
        }
        info!("Local media {} released", media.stream_id());
    }

    async fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        info!("Session state: {} -> {}", self.state, next);
        self.state = next;
        self.io.observer.on_state_changed(next).await;
    }
}
