//! Configuration types for the echo relay

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payload type registered for VP8 video
pub const DEFAULT_VIDEO_PAYLOAD_TYPE: u8 = 96;

/// Payload type registered for Opus audio
pub const DEFAULT_AUDIO_PAYLOAD_TYPE: u8 = 111;

/// Main configuration for a relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// STUN (or TURN) server URLs handed to the ICE agent
    pub stun_servers: Vec<String>,

    /// Payload type of the local video track (default: 96, VP8)
    pub video_payload_type: u8,

    /// Payload type of the local audio track (default: 111, Opus)
    pub audio_payload_type: u8,

    /// Media stream id shared by both local tracks
    pub stream_id: String,

    /// Picture-loss indication interval in milliseconds (default: 3000)
    pub pli_interval_ms: u64,

    /// Capacity of the signaling message queue (default: 128)
    pub message_queue_capacity: usize,

    /// Capacity of the remote-track notification channel (default: 8)
    pub remote_track_capacity: usize,

    /// Upper bound on ICE gathering before the answer is sent (default: 2500)
    pub ice_gather_timeout_ms: u64,

    /// Time relay tasks get to exit at teardown before being aborted (default: 500)
    pub teardown_grace_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            video_payload_type: DEFAULT_VIDEO_PAYLOAD_TYPE,
            audio_payload_type: DEFAULT_AUDIO_PAYLOAD_TYPE,
            stream_id: "rtc-echo".to_string(),
            pli_interval_ms: 3000,
            message_queue_capacity: 128,
            remote_track_capacity: 8,
            ice_gather_timeout_ms: 2500,
            teardown_grace_ms: 500,
        }
    }
}

impl RelayConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty or contains a non `stun:`/`stuns:`/`turn:`/`turns:` URL
    /// - a payload type is above 127 or both payload types are equal
    /// - `stream_id` is empty
    /// - any interval or capacity is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        for url in &self.stun_servers {
            let valid = ["stun:", "stuns:", "turn:", "turns:"]
                .iter()
                .any(|scheme| url.starts_with(scheme));
            if !valid {
                return Err(Error::InvalidConfig(format!(
                    "ICE server URL must start with stun: or turn:, got '{}'",
                    url
                )));
            }
        }

        for (name, pt) in [
            ("video_payload_type", self.video_payload_type),
            ("audio_payload_type", self.audio_payload_type),
        ] {
            if pt > 127 {
                return Err(Error::InvalidConfig(format!(
                    "{} must be in range 0-127, got {}",
                    name, pt
                )));
            }
        }

        if self.video_payload_type == self.audio_payload_type {
            return Err(Error::InvalidConfig(format!(
                "video and audio payload types must differ, both are {}",
                self.video_payload_type
            )));
        }

        if self.stream_id.is_empty() {
            return Err(Error::InvalidConfig("stream_id cannot be empty".to_string()));
        }

        if self.pli_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "pli_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.ice_gather_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "ice_gather_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.teardown_grace_ms == 0 {
            return Err(Error::InvalidConfig(
                "teardown_grace_ms must be greater than 0".to_string(),
            ));
        }

        if self.message_queue_capacity == 0 || self.remote_track_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue capacities must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn pli_interval(&self) -> Duration {
        Duration::from_millis(self.pli_interval_ms)
    }

    pub fn ice_gather_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gather_timeout_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}
