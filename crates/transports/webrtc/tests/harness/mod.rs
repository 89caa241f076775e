//! Echo relay integration test harness
//!
//! - `media`: synthetic RTP packet streams
//! - `mock_peer`: in-memory `MediaPeer` with inspectable tracks
//! - `signaling`: in-memory WebSocket pairs and a browser-side test client
//!
//! Basic usage pattern:
//!
//! 1. Create a `MockPeer` and a `ws_pair()`
//! 2. Start a `Session` on the server half and spawn `run()`
//! 3. Drive the browser side through `TestClient`
//! 4. Inspect the peer's tracks and the returned `SessionReport`

#![allow(dead_code)]

pub mod media;
pub mod mock_peer;
pub mod signaling;

use std::time::Duration;

pub use media::RtpGenerator;
pub use mock_peer::{MockInboundTrack, MockOutboundTrack, MockPeer, MOCK_ANSWER_SDP};
pub use signaling::{ws_pair, ServerSocket, TestClient};

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Client error: {0}")]
    ClientError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Relay error: {0}")]
    Relay(#[from] rtc_echo_webrtc::Error),
}

/// Initialize tracing for tests (call once per test)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,webrtc=warn")
        .with_test_writer()
        .try_init();
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, what: &str, mut condition: F) -> HarnessResult<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return Err(HarnessError::Timeout(what.to_string()));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}
