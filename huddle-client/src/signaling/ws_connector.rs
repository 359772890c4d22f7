use crate::error::TransportError;
use crate::signaling::channel_event::ChannelEvent;
use crate::signaling::connector::{Connector, Link};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info};

const ABNORMAL_CLOSE_CODE: u16 = 1006;
const NO_STATUS_CODE: u16 = 1005;

/// WebSocket connector over tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

struct WsLink {
    tx: mpsc::UnboundedSender<Message>,
}

impl Link for WsLink {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(Message::Text(text))
            .map_err(|_| TransportError::Send("websocket writer has stopped".to_owned()))
    }

    fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        endpoint: &str,
        generation: u64,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Box<dyn Link>, TransportError> {
        info!("Connecting to relay {} (generation {})", endpoint, generation);

        let (ws_stream, _) =
            connect_async(endpoint)
                .await
                .map_err(|e| TransportError::Connect {
                    endpoint: endpoint.to_owned(),
                    reason: e.to_string(),
                })?;

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            debug!("Writer task for generation {} terminated", generation);
        });

        tokio::spawn(async move {
            let (code, reason) = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let event = ChannelEvent::Message { generation, text };
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS_CODE, String::new()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break (ABNORMAL_CLOSE_CODE, e.to_string()),
                    None => break (ABNORMAL_CLOSE_CODE, "connection dropped".to_owned()),
                }
            };

            debug!(
                "Reader task for generation {} terminated (code {})",
                generation, code
            );
            let _ = events.send(ChannelEvent::Closed {
                generation,
                code,
                reason,
            });
        });

        Ok(Box::new(WsLink { tx }))
    }
}
