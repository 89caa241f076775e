//! WebRTC peer connection management

use crate::config::RelayConfig;
use crate::media::{
    InboundTrack, LocalTrackRequest, MediaKind, OutboundTrack, RtpPacket, TrackDescriptor,
};
use crate::peer::{FeedbackSink, MediaPeer};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

fn codec_capability(kind: MediaKind) -> RTCRtpCodecCapability {
    match kind {
        MediaKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![
                RTCPFeedback {
                    typ: "goog-remb".to_owned(),
                    parameter: String::new(),
                },
                RTCPFeedback {
                    typ: "ccm".to_owned(),
                    parameter: "fir".to_owned(),
                },
                RTCPFeedback {
                    typ: "nack".to_owned(),
                    parameter: String::new(),
                },
                RTCPFeedback {
                    typ: "nack".to_owned(),
                    parameter: "pli".to_owned(),
                },
            ],
        },
        MediaKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
    }
}

fn codec_type(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Video => RTPCodecType::Video,
        MediaKind::Audio => RTPCodecType::Audio,
    }
}

/// WebRTC peer connection wrapper
///
/// Registers exactly VP8 and Opus at the configured payload types, so the
/// payload type of every inbound packet identifies its local track.
pub struct PeerConnection {
    /// Unique identifier for this connection instance
    connection_id: String,

    peer_connection: Arc<RTCPeerConnection>,

    /// Upper bound on waiting for ICE gathering before answering
    ice_gather_timeout: Duration,
}

impl PeerConnection {
    /// Create a new peer connection
    ///
    /// Returns the connection and the channel on which remote tracks are
    /// delivered as the browser's media arrives.
    #[instrument(skip(config))]
    pub async fn new(
        config: &RelayConfig,
    ) -> Result<(Self, mpsc::Receiver<Arc<dyn InboundTrack>>)> {
        config.validate()?;

        let connection_id = uuid::Uuid::new_v4().to_string();
        info!("Creating peer connection: connection_id={}", connection_id);

        let mut media_engine = MediaEngine::default();
        for (kind, payload_type) in [
            (MediaKind::Video, config.video_payload_type),
            (MediaKind::Audio, config.audio_payload_type),
        ] {
            media_engine
                .register_codec(
                    RTCRtpCodecParameters {
                        capability: codec_capability(kind),
                        payload_type,
                        ..Default::default()
                    },
                    codec_type(kind),
                )
                .map_err(|e| {
                    Error::WebRtc(format!("Failed to register {} codec: {}", kind, e))
                })?;
        }

        let interceptor_registry =
            register_default_interceptors(Registry::new(), &mut media_engine).map_err(|e| {
                Error::WebRtc(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtc(format!("Failed to create peer connection: {}", e))
            })?);

        let id = connection_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let id = id.clone();
                Box::pin(async move {
                    match s {
                        RTCPeerConnectionState::Failed => {
                            warn!("Peer connection {} failed", id)
                        }
                        _ => info!("Peer connection {} state: {}", id, s),
                    }
                })
            },
        ));

        let (track_tx, track_rx) = mpsc::channel(config.remote_track_capacity);
        let id = connection_id.clone();
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            let id = id.clone();
            Box::pin(async move {
                info!(
                    "Remote track on connection {}: ssrc={} kind={} payload_type={}",
                    id,
                    track.ssrc(),
                    track.kind(),
                    track.payload_type()
                );
                let remote: Arc<dyn InboundTrack> = Arc::new(RemoteTrack::new(track));
                if track_tx.send(remote).await.is_err() {
                    debug!("Session for connection {} gone, ignoring remote track", id);
                }
            })
        }));

        Ok((
            Self {
                connection_id,
                peer_connection,
                ice_gather_timeout: config.ice_gather_timeout(),
            },
            track_rx,
        ))
    }

    /// Get the connection ID
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Current state of the underlying connection
    pub fn state(&self) -> RTCPeerConnectionState {
        self.peer_connection.connection_state()
    }
}

#[async_trait]
impl FeedbackSink for PeerConnection {
    async fn send_picture_loss(&self, media_ssrc: u32) -> Result<()> {
        self.peer_connection
            .write_rtcp(&[Box::new(PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc,
            })])
            .await
            .map(|_| ())
            .map_err(|e| Error::Feedback(format!("Failed to send PLI for ssrc {}: {}", media_ssrc, e)))
    }
}

#[async_trait]
impl MediaPeer for PeerConnection {
    async fn add_local_track(&self, request: LocalTrackRequest) -> Result<Arc<dyn OutboundTrack>> {
        info!(
            "Adding local {} track to connection {}",
            request.kind, self.connection_id
        );

        let track = Arc::new(TrackLocalStaticRTP::new(
            codec_capability(request.kind),
            request.kind.as_str().to_owned(),
            request.stream_id.clone(),
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| {
                Error::WebRtc(format!("Failed to add {} track: {}", request.kind, e))
            })?;

        let ssrc = sender
            .get_parameters()
            .await
            .encodings
            .first()
            .map(|encoding| encoding.ssrc)
            .ok_or_else(|| {
                Error::WebRtc(format!("No encoding assigned to local {} track", request.kind))
            })?;

        // Inbound RTCP has to be read for interceptors (NACK, reports) to run
        let kind = request.kind;
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
            debug!("RTCP reader for local {} track ended", kind);
        });

        debug!("Local {} track ssrc={}", request.kind, ssrc);

        Ok(Arc::new(RtpOutboundTrack {
            descriptor: TrackDescriptor {
                kind: request.kind,
                payload_type: request.payload_type,
                ssrc,
                stream_id: request.stream_id,
            },
            track,
        }))
    }

    async fn apply_remote_offer(&self, sdp: &str) -> Result<()> {
        let offer = RTCSessionDescription::offer(sdp.to_owned())
            .map_err(|e| Error::Negotiation(format!("Failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set remote description: {}", e)))
    }

    async fn create_local_answer(&self) -> Result<String> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to create answer: {}", e)))?;

        let mut gather_complete = self.peer_connection.gathering_complete_promise().await;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set local description: {}", e)))?;

        // The answer carries the gathered candidates; nothing is trickled
        if tokio::time::timeout(self.ice_gather_timeout, gather_complete.recv())
            .await
            .is_err()
        {
            debug!(
                "ICE gathering timeout after {:?} for connection {}",
                self.ice_gather_timeout, self.connection_id
            );
        }

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::Negotiation("No local description after setting answer".to_string())
            })?;

        Ok(local_desc.sdp)
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()> {
        debug!(
            "Adding ICE candidate for connection {}: {}",
            self.connection_id, candidate
        );

        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.to_owned(),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Candidate(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        info!(
            "Closing peer connection {} in state {}",
            self.connection_id,
            self.state()
        );

        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::WebRtc(format!("Failed to close connection: {}", e)))
    }
}

/// Local track backed by a webrtc-rs static RTP track
pub struct RtpOutboundTrack {
    descriptor: TrackDescriptor,
    track: Arc<TrackLocalStaticRTP>,
}

#[async_trait]
impl OutboundTrack for RtpOutboundTrack {
    fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    async fn write_rtp(&self, packet: &RtpPacket) -> Result<()> {
        self.track
            .write_rtp(packet)
            .await
            .map(|_| ())
            .map_err(|e| Error::Relay(e.to_string()))
    }
}

/// Remote track as delivered by `on_track`
pub struct RemoteTrack {
    track: Arc<TrackRemote>,
}

impl RemoteTrack {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl InboundTrack for RemoteTrack {
    fn ssrc(&self) -> u32 {
        self.track.ssrc()
    }

    fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_codec_type(self.track.kind())
    }

    async fn read_rtp(&self) -> Result<RtpPacket> {
        let (packet, _) = self.track.read_rtp().await?;
        Ok(packet)
    }
}
