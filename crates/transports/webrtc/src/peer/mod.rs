//! Peer connection abstraction
//!
//! The session drives negotiation through [`MediaPeer`] and hands relay tasks
//! an `Arc<dyn FeedbackSink>` of the same peer. [`PeerConnection`] is the
//! webrtc-rs implementation.

pub mod connection;

pub use connection::{PeerConnection, RemoteTrack, RtpOutboundTrack};

use crate::media::{LocalTrackRequest, OutboundTrack};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Receiver-side RTCP the relay sends towards the browser
#[async_trait]
pub trait FeedbackSink: Send + Sync + 'static {
    /// Ask the sender of `media_ssrc` for a new keyframe
    ///
    /// Best-effort; fails with `Feedback` when the transport is gone.
    async fn send_picture_loss(&self, media_ssrc: u32) -> Result<()>;
}

/// Negotiation and track management on one peer connection
#[async_trait]
pub trait MediaPeer: FeedbackSink {
    /// Create a local track and add it to the connection
    ///
    /// Must happen before the answer is created so the answer offers it.
    async fn add_local_track(&self, request: LocalTrackRequest) -> Result<Arc<dyn OutboundTrack>>;

    /// Apply a remote SDP offer; fails with `Negotiation`
    async fn apply_remote_offer(&self, sdp: &str) -> Result<()>;

    /// Create the answer, apply it locally and return its SDP; fails with `Negotiation`
    async fn create_local_answer(&self) -> Result<String>;

    /// Apply one remote ICE candidate; fails with `Candidate`
    async fn add_ice_candidate(&self, candidate: &str) -> Result<()>;

    /// Close the connection, ending every remote track
    async fn close(&self) -> Result<()>;
}
