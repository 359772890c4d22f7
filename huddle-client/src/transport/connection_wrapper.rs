use crate::error::NegotiationError;
use crate::transport::media::{MediaHandle, RemoteTrack, TrackKind};
use crate::transport::peer_connection::PeerConnection;
use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::{PeerKey, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use huddle_core::{IceCandidate, SdpKind, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// webrtc-rs peer connection bound to one negotiation instance.
pub struct ConnectionWrapper {
    pub key: PeerKey,
    pub peer_connection: Arc<RTCPeerConnection>,
}

impl ConnectionWrapper {
    /// Build a peer connection whose callbacks feed `event_tx`.
    pub async fn new(
        key: PeerKey,
        config: &TransportConfig,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        // 1. Codecs and interceptors (RTCP reports, NACK)
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        // 2. STUN/TURN servers
        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        // 3. Connection state: disconnected/failed is terminal for this negotiation
        let state_tx = event_tx.clone();
        let state_key = key.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let key = state_key.clone();

                Box::pin(async move {
                    info!("Peer connection state for {}: {}", key, s);
                    if matches!(
                        s,
                        RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected
                    ) {
                        let _ = tx.send(TransportEvent::Disconnected(key, s.to_string()));
                    }
                })
            },
        ));

        // 4. Trickle ICE
        let ice_tx = event_tx.clone();
        let ice_key = key.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let key = ice_key.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx.send(TransportEvent::CandidateGenerated(key, from_rtc_candidate(init)));
            })
        }));

        // 5. Remote media
        let track_tx = event_tx.clone();
        let track_key = key.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                let key = track_key.clone();

                Box::pin(async move {
                    let remote = RemoteTrack {
                        id: track.id(),
                        stream_id: track.stream_id(),
                        kind: track_kind(track.kind()),
                    };
                    debug!("Remote track {:?} from {}", remote, key);
                    let _ = tx.send(TransportEvent::RemoteTrack(key, remote));
                })
            },
        ));

        let negotiation_tx = event_tx;
        let negotiation_key = key.clone();
        peer_connection.on_negotiation_needed(Box::new(move || {
            let tx = negotiation_tx.clone();
            let key = negotiation_key.clone();

            Box::pin(async move {
                let _ = tx.send(TransportEvent::NegotiationNeeded(key));
            })
        }));

        Ok(Self {
            key,
            peer_connection,
        })
    }
}

#[async_trait]
impl PeerConnection for ConnectionWrapper {
    async fn add_tracks(&self, media: &MediaHandle) -> Result<(), NegotiationError> {
        for track in media.tracks() {
            self.peer_connection
                .add_track(Arc::clone(track))
                .await
                .map_err(|e| NegotiationError::capability("add_track", e))?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| NegotiationError::capability("create_offer", e))?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| NegotiationError::capability("create_answer", e))?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection
            .set_local_description(desc)
            .await
            .map_err(|e| NegotiationError::capability("set_local_description", e))
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(|e| NegotiationError::capability("set_remote_description", e))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| NegotiationError::capability("add_ice_candidate", e))
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| NegotiationError::capability("close", e))
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, NegotiationError> {
    let parsed = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    parsed.map_err(|e| NegotiationError::capability("parse_sdp", e))
}

fn from_rtc_description(desc: RTCSessionDescription) -> Result<SessionDescription, NegotiationError> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        _ => Err(NegotiationError::InvalidDescription {
            expected: "offer or answer",
            actual: "pranswer/rollback",
        }),
    }
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn track_kind(kind: RTPCodecType) -> TrackKind {
    match kind {
        RTPCodecType::Audio => TrackKind::Audio,
        RTPCodecType::Video => TrackKind::Video,
        _ => TrackKind::Unknown,
    }
}
