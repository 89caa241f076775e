//! In-memory peer for session tests
//!
//! Behaves like a peer connection that always negotiates successfully unless
//! told otherwise, and records everything the session asks of it.

use async_trait::async_trait;
use rtc_echo_webrtc::media::{LocalTrackRequest, RtpPacket};
use rtc_echo_webrtc::{
    Error, FeedbackSink, InboundTrack, MediaKind, MediaPeer, OutboundTrack, Result,
    TrackDescriptor,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// SDP the mock peer answers every offer with
pub const MOCK_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-answer\r\n";

/// Marker in a candidate string that makes the mock reject it
pub const BAD_CANDIDATE_MARKER: &str = "garbage";

/// Local track that records every packet written to it
pub struct MockOutboundTrack {
    descriptor: TrackDescriptor,
    written: Mutex<Vec<RtpPacket>>,
    fail_writes: AtomicBool,
}

impl MockOutboundTrack {
    pub fn written(&self) -> Vec<RtpPacket> {
        self.written.lock().unwrap().clone()
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn ssrc(&self) -> u32 {
        self.descriptor.ssrc
    }
}

#[async_trait]
impl OutboundTrack for MockOutboundTrack {
    fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    async fn write_rtp(&self, packet: &RtpPacket) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Relay("mock track closed".to_string()));
        }
        self.written.lock().unwrap().push(packet.clone());
        Ok(())
    }
}

/// Remote track fed from the test through a channel
pub struct MockInboundTrack {
    ssrc: u32,
    kind: MediaKind,
    rx: tokio::sync::Mutex<mpsc::Receiver<RtpPacket>>,
}

impl MockInboundTrack {
    /// Create a track; dropping the returned sender ends it
    pub fn new(ssrc: u32, kind: MediaKind) -> (Arc<Self>, mpsc::Sender<RtpPacket>) {
        let (tx, rx) = mpsc::channel(256);
        let track = Arc::new(Self {
            ssrc,
            kind,
            rx: tokio::sync::Mutex::new(rx),
        });
        (track, tx)
    }
}

#[async_trait]
impl InboundTrack for MockInboundTrack {
    fn ssrc(&self) -> u32 {
        self.ssrc
    }

    fn kind(&self) -> Option<MediaKind> {
        Some(self.kind)
    }

    async fn read_rtp(&self) -> Result<RtpPacket> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Error::WebRtc("remote track ended".to_string()))
    }
}

/// Scriptable `MediaPeer`
pub struct MockPeer {
    next_ssrc: AtomicU32,
    duplicate_ssrc: AtomicBool,
    fail_offer: AtomicBool,
    fail_answer: AtomicBool,

    local_tracks: Mutex<Vec<Arc<MockOutboundTrack>>>,
    offers: Mutex<Vec<String>>,
    candidates: Mutex<Vec<String>>,
    picture_loss: Mutex<Vec<u32>>,
    close_calls: AtomicUsize,

    remote_tx: Mutex<Option<mpsc::Sender<Arc<dyn InboundTrack>>>>,
}

impl MockPeer {
    /// Create a peer and the remote-track channel the session consumes
    pub fn new() -> (Arc<Self>, mpsc::Receiver<Arc<dyn InboundTrack>>) {
        let (tx, rx) = mpsc::channel(8);
        let peer = Arc::new(Self {
            next_ssrc: AtomicU32::new(1001),
            duplicate_ssrc: AtomicBool::new(false),
            fail_offer: AtomicBool::new(false),
            fail_answer: AtomicBool::new(false),
            local_tracks: Mutex::new(Vec::new()),
            offers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            picture_loss: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            remote_tx: Mutex::new(Some(tx)),
        });
        (peer, rx)
    }

    /// Give both local tracks the same ssrc
    pub fn with_duplicate_ssrc(self: Arc<Self>) -> Arc<Self> {
        self.duplicate_ssrc.store(true, Ordering::SeqCst);
        self
    }

    /// Reject every remote offer
    pub fn failing_offers(self: Arc<Self>) -> Arc<Self> {
        self.fail_offer.store(true, Ordering::SeqCst);
        self
    }

    /// Fail answer creation
    pub fn failing_answers(self: Arc<Self>) -> Arc<Self> {
        self.fail_answer.store(true, Ordering::SeqCst);
        self
    }

    /// Deliver a remote track as if the browser started sending it
    pub async fn add_remote_track(&self, track: Arc<dyn InboundTrack>) {
        let tx = self.remote_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(track).await;
        }
    }

    pub fn local_track(&self, kind: MediaKind) -> Option<Arc<MockOutboundTrack>> {
        self.local_tracks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.descriptor.kind == kind)
            .cloned()
    }

    pub fn offers(&self) -> Vec<String> {
        self.offers.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn picture_loss(&self) -> Vec<u32> {
        self.picture_loss.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackSink for MockPeer {
    async fn send_picture_loss(&self, media_ssrc: u32) -> Result<()> {
        if self.close_calls() > 0 {
            return Err(Error::Feedback("peer closed".to_string()));
        }
        self.picture_loss.lock().unwrap().push(media_ssrc);
        Ok(())
    }
}

#[async_trait]
impl MediaPeer for MockPeer {
    async fn add_local_track(&self, request: LocalTrackRequest) -> Result<Arc<dyn OutboundTrack>> {
        let ssrc = if self.duplicate_ssrc.load(Ordering::SeqCst) {
            4242
        } else {
            self.next_ssrc.fetch_add(1, Ordering::SeqCst)
        };

        let track = Arc::new(MockOutboundTrack {
            descriptor: TrackDescriptor {
                kind: request.kind,
                payload_type: request.payload_type,
                ssrc,
                stream_id: request.stream_id,
            },
            written: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        });
        self.local_tracks.lock().unwrap().push(track.clone());
        Ok(track)
    }

    async fn apply_remote_offer(&self, sdp: &str) -> Result<()> {
        if self.fail_offer.load(Ordering::SeqCst) || sdp.is_empty() {
            return Err(Error::Negotiation("mock rejected offer".to_string()));
        }
        self.offers.lock().unwrap().push(sdp.to_string());
        Ok(())
    }

    async fn create_local_answer(&self) -> Result<String> {
        if self.fail_answer.load(Ordering::SeqCst) {
            return Err(Error::Negotiation("mock failed to answer".to_string()));
        }
        Ok(MOCK_ANSWER_SDP.to_string())
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()> {
        if candidate.contains(BAD_CANDIDATE_MARKER) {
            return Err(Error::Candidate(format!("mock rejected {}", candidate)));
        }
        self.candidates.lock().unwrap().push(candidate.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        // Like a real connection, closing ends remote track delivery
        self.remote_tx.lock().unwrap().take();
        Ok(())
    }
}
