use crate::error::{MediaError, NegotiationError};
use crate::transport::connection_wrapper::ConnectionWrapper;
use crate::transport::media::{LocalTrack, MediaConstraints, MediaHandle};
use crate::transport::peer_connection::{MediaBackend, PeerConnection};
use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::{PeerKey, TransportEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// [`MediaBackend`] on top of webrtc-rs.
///
/// Capture yields sample-fed local tracks (Opus audio, VP8 video); the
/// embedding application writes samples into them from its device layer.
pub struct WebrtcBackend {
    config: TransportConfig,
}

impl WebrtcBackend {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Default for WebrtcBackend {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[async_trait]
impl MediaBackend for WebrtcBackend {
    async fn create_local_capture(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaHandle, MediaError> {
        let stream_id = format!("huddle-{}", Uuid::new_v4().simple());
        let mut tracks: Vec<LocalTrack> = Vec::new();

        if constraints.audio {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    ..Default::default()
                },
                "audio".to_owned(),
                stream_id.clone(),
            )));
        }

        if constraints.video {
            tracks.push(Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                stream_id.clone(),
            )));
        }

        info!("Local capture {} with {} track(s)", stream_id, tracks.len());
        Ok(MediaHandle::new(stream_id, tracks))
    }

    async fn create_peer_connection(
        &self,
        key: PeerKey,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PeerConnection>, NegotiationError> {
        let wrapper = ConnectionWrapper::new(key, &self.config, events)
            .await
            .map_err(|e| NegotiationError::capability("create_peer_connection", e))?;
        Ok(Box::new(wrapper))
    }
}
