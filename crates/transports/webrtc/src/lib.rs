//! Single-peer WebRTC echo relay
//!
//! A browser connects over a WebSocket, negotiates one peer connection and
//! receives its own camera and microphone streams back, while the relay asks
//! it for a keyframe every few seconds.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Browser                                                 │
//! │  ↓ WebSocket ({type, payload} JSON)     ↓ RTP/RTCP       │
//! │  SignalingReceiver ── pump ──► MessageQueue              │
//! │                                  ↓                       │
//! │  Session (NegotiationState) ─► SignalingSender (answer)  │
//! │  ├─ MediaPeer (PeerConnection over webrtc-rs)            │
//! │  ├─ LocalTrackSlot (video + audio, published once)       │
//! │  └─ TrackRelay per remote track                          │
//! │     ├─ forwarding loop (route by PT, rewrite ssrc)       │
//! │     └─ feedback loop (PLI every interval)                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rtc_echo_webrtc::RelayConfig;
//!
//! let config = RelayConfig {
//!     pli_interval_ms: 2000,
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.video_payload_type, 96);
//! ```
//!
//! ## Serving a connection
//!
//! ```no_run
//! use rtc_echo_webrtc::{serve_tcp, RelayConfig};
//! use tokio::net::TcpListener;
//!
//! # async fn example() -> rtc_echo_webrtc::Result<()> {
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! let (stream, _) = listener.accept().await?;
//! let report = serve_tcp(stream, RelayConfig::default(), std::future::pending()).await?;
//! println!("session ended in state {}", report.final_state);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channels;
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use channels::{MessageQueue, QueueConsumer, QueueEvent, QueueProducer};
pub use config::RelayConfig;
pub use error::{Error, Result};
pub use media::{
    InboundTrack, LocalTrackSlot, LocalTracks, MediaKind, OutboundTrack, RelayReport,
    TrackDescriptor, TrackRelay,
};
pub use peer::{FeedbackSink, MediaPeer, PeerConnection};
pub use session::{
    serve_connection, serve_tcp, CloseReason, NegotiationState, Session, SessionReport,
    StepOutcome,
};
pub use signaling::{MessageKind, SignalingChannel, SignalingMessage};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
