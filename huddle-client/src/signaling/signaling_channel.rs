use crate::config::ReconnectPolicy;
use crate::error::TransportError;
use crate::signaling::channel_event::ChannelEvent;
use crate::signaling::connector::{Connector, Link};
use crate::signaling::signaling_output::SignalingOutput;
use huddle_core::{SignalMessage, decode, encode};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a [`ChannelEvent`] means to the owner of the channel.
#[derive(Debug)]
pub enum ChannelSignal {
    Message(SignalMessage),
    Closed {
        code: u16,
        reason: String,
        abnormal: bool,
    },
    ReconnectDue(u32),
    Ignored,
}

/// Owns the relay connection: encoding, decoding, intentional close and the
/// reconnect timer.
///
/// Every (re)connect bumps the generation; an intentional disconnect bumps it
/// too, so the close that follows is recognised as stale and never reaches
/// the reconnection logic.
pub struct SignalingChannel {
    endpoint: String,
    connector: Arc<dyn Connector>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    link: Option<Box<dyn Link>>,
    generation: u64,
    policy: ReconnectPolicy,
    normal_close_code: u16,
    attempts: u32,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl SignalingChannel {
    pub fn new(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        normal_close_code: u16,
        events_tx: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            connector,
            events_tx,
            link: None,
            generation: 0,
            policy,
            normal_close_code,
            attempts: 0,
            reconnect_timer: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    /// Open the connection. Resolves once the relay accepted it.
    pub async fn open(&mut self) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Ok(());
        }

        self.generation += 1;
        let link = self
            .connector
            .connect(&self.endpoint, self.generation, self.events_tx.clone())
            .await?;

        info!(
            "Signaling channel open: {} (generation {})",
            self.endpoint, self.generation
        );
        self.link = Some(link);
        Ok(())
    }

    /// Intentional close. Safe to call when already closed.
    pub fn disconnect(&mut self, reason: &str) {
        self.cancel_reconnect();

        let Some(link) = self.link.take() else {
            return;
        };
        link.close(self.normal_close_code, reason);
        self.generation += 1;
        info!("Signaling channel closed: {}", reason);
    }

    /// Interpret an event from the connection or the reconnect timer.
    pub fn on_event(&mut self, event: ChannelEvent) -> ChannelSignal {
        match event {
            ChannelEvent::Message { generation, text } => {
                if generation != self.generation || self.link.is_none() {
                    debug!("Dropping frame from stale connection {}", generation);
                    return ChannelSignal::Ignored;
                }
                match decode(&text) {
                    Ok(msg) => ChannelSignal::Message(msg),
                    Err(e) => {
                        warn!("Invalid signaling message: {} ({})", e, text);
                        ChannelSignal::Ignored
                    }
                }
            }

            ChannelEvent::Closed {
                generation,
                code,
                reason,
            } => {
                if generation != self.generation || self.link.is_none() {
                    debug!("Ignoring close of stale connection {}", generation);
                    return ChannelSignal::Ignored;
                }
                self.link = None;
                let abnormal = code != self.normal_close_code;
                warn!(
                    "Signaling channel closed by transport (code {}, reason {:?})",
                    code, reason
                );
                ChannelSignal::Closed {
                    code,
                    reason,
                    abnormal,
                }
            }

            ChannelEvent::ReconnectDue { attempt } => {
                if self.reconnect_timer.is_none() || attempt != self.attempts {
                    debug!("Ignoring cancelled reconnect attempt {}", attempt);
                    return ChannelSignal::Ignored;
                }
                self.reconnect_timer = None;
                ChannelSignal::ReconnectDue(attempt)
            }
        }
    }

    /// Arm the reconnect timer. Returns `false` once attempts are exhausted.
    pub fn schedule_reconnect(&mut self) -> bool {
        if self.attempts >= self.policy.max_attempts {
            warn!(
                "Giving up reconnecting after {} attempt(s)",
                self.attempts
            );
            return false;
        }

        self.attempts += 1;
        let attempt = self.attempts;
        let delay = self.policy.delay_for(attempt);
        info!(
            "Reconnect attempt {}/{} in {:?}",
            attempt, self.policy.max_attempts, delay
        );

        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        let tx = self.events_tx.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ChannelEvent::ReconnectDue { attempt });
        }));
        true
    }

    pub fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
            debug!("Pending reconnect cancelled");
        }
        self.attempts = 0;
    }

    /// Forget previous failures after a successful rejoin.
    pub fn reset_backoff(&mut self) {
        self.attempts = 0;
    }
}

impl SignalingOutput for SignalingChannel {
    fn send(&self, msg: SignalMessage) {
        let Some(link) = &self.link else {
            warn!("Dropping {} message: signaling channel is not open", msg.kind());
            return;
        };

        match encode(&msg) {
            Ok(json) => {
                if let Err(e) = link.send_text(json) {
                    warn!("Failed to send {} message: {}", msg.kind(), e);
                }
            }
            Err(e) => warn!("Failed to encode {} message: {}", msg.kind(), e),
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}
