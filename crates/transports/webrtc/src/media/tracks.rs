//! Local and remote track abstractions
//!
//! The relay only ever sees tracks through [`InboundTrack`] and
//! [`OutboundTrack`]; `peer::connection` provides the webrtc-rs backed
//! implementations.

use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

/// RTP packet as read from and written to tracks
pub use webrtc::rtp::packet::Packet as RtpPacket;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Map a webrtc-rs codec type; `Unspecified` has no media kind
    pub fn from_codec_type(codec_type: RTPCodecType) -> Option<Self> {
        match codec_type {
            RTPCodecType::Audio => Some(MediaKind::Audio),
            RTPCodecType::Video => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a local outbound track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub kind: MediaKind,

    /// Payload type packets must carry to be routed to this track
    pub payload_type: u8,

    /// Synchronization source written on every forwarded packet
    pub ssrc: u32,

    /// Media stream id announced in SDP
    pub stream_id: String,
}

/// What the session asks the peer for when creating a local track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrackRequest {
    pub kind: MediaKind,
    pub payload_type: u8,
    pub stream_id: String,
}

/// Local track the relay writes echoed packets to
#[async_trait]
pub trait OutboundTrack: Send + Sync {
    fn descriptor(&self) -> &TrackDescriptor;

    /// Write one packet; a failure ends the forwarding loop that called it
    async fn write_rtp(&self, packet: &RtpPacket) -> Result<()>;
}

/// Remote track the browser sends on
#[async_trait]
pub trait InboundTrack: Send + Sync {
    /// Synchronization source of the remote stream
    fn ssrc(&self) -> u32;

    fn kind(&self) -> Option<MediaKind>;

    /// Read the next packet; fails once the track or connection is gone
    async fn read_rtp(&self) -> Result<RtpPacket>;
}

/// The session's pair of outbound tracks
#[derive(Clone)]
pub struct LocalTracks {
    video: Arc<dyn OutboundTrack>,
    audio: Arc<dyn OutboundTrack>,
}

impl LocalTracks {
    /// Pair a video and an audio track
    ///
    /// Fails if the kinds are wrong, or if the two tracks share an ssrc or a
    /// payload type (either would make routing ambiguous).
    pub fn new(video: Arc<dyn OutboundTrack>, audio: Arc<dyn OutboundTrack>) -> Result<Self> {
        let (v, a) = (video.descriptor(), audio.descriptor());

        if v.kind != MediaKind::Video || a.kind != MediaKind::Audio {
            return Err(Error::WebRtc(format!(
                "Local tracks have kinds {}/{}, expected video/audio",
                v.kind, a.kind
            )));
        }
        if v.ssrc == a.ssrc {
            return Err(Error::WebRtc(format!(
                "Local video and audio tracks share ssrc {}",
                v.ssrc
            )));
        }
        if v.payload_type == a.payload_type {
            return Err(Error::WebRtc(format!(
                "Local video and audio tracks share payload type {}",
                v.payload_type
            )));
        }

        Ok(Self { video, audio })
    }

    pub fn video(&self) -> &Arc<dyn OutboundTrack> {
        &self.video
    }

    pub fn audio(&self) -> &Arc<dyn OutboundTrack> {
        &self.audio
    }

    /// Track whose payload type matches, if any
    pub fn route(&self, payload_type: u8) -> Option<&Arc<dyn OutboundTrack>> {
        if payload_type == self.video.descriptor().payload_type {
            Some(&self.video)
        } else if payload_type == self.audio.descriptor().payload_type {
            Some(&self.audio)
        } else {
            None
        }
    }
}

impl fmt::Debug for LocalTracks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTracks")
            .field("video", self.video.descriptor())
            .field("audio", self.audio.descriptor())
            .finish()
    }
}

/// Write side of the local-track slot, consumed by the single publish
pub struct LocalTrackPublisher {
    tx: watch::Sender<Option<LocalTracks>>,
}

impl LocalTrackPublisher {
    /// Make the tracks visible to every relay task
    pub fn publish(self, tracks: LocalTracks) {
        self.tx.send_replace(Some(tracks));
    }
}

/// Read side of the local-track slot, cloned into each forwarding loop
///
/// Empty until the session publishes its tracks; never emptied afterwards.
#[derive(Clone)]
pub struct LocalTrackSlot {
    rx: watch::Receiver<Option<LocalTracks>>,
}

impl LocalTrackSlot {
    pub fn new() -> (LocalTrackPublisher, LocalTrackSlot) {
        let (tx, rx) = watch::channel(None);
        (LocalTrackPublisher { tx }, LocalTrackSlot { rx })
    }

    /// Tracks if already published
    pub fn current(&self) -> Option<LocalTracks> {
        self.rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
