use crate::error::TransportError;
use crate::signaling::channel_event::ChannelEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// An open duplex connection to the relay.
pub trait Link: Send + Sync {
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Close intentionally with the given close code.
    fn close(&self, code: u16, reason: &str);
}

/// Opens relay connections.
///
/// `connect` resolves only once the connection is open. Every inbound frame
/// and the final close are posted to `events` tagged with `generation`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        generation: u64,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Box<dyn Link>, TransportError>;
}
