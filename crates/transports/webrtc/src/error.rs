//! Error types for the echo relay

/// Result type alias using the relay Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while signaling, negotiating or relaying media
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling transport read failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Signaling connection closed by the peer or by teardown
    #[error("Signaling connection closed")]
    ConnectionClosed,

    /// Malformed signaling frame
    #[error("Decode error: {0}")]
    Decode(String),

    /// Well-formed frame with a `type` this relay does not know
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Signaling transport write failure
    #[error("Send error: {0}")]
    Send(String),

    /// SDP offer/answer could not be applied or produced
    #[error("SDP negotiation error: {0}")]
    Negotiation(String),

    /// ICE candidate was malformed or rejected
    #[error("ICE candidate error: {0}")]
    Candidate(String),

    /// Writing to a local track failed
    #[error("Relay error: {0}")]
    Relay(String),

    /// Picture-loss feedback could not be sent
    #[error("Feedback error: {0}")]
    Feedback(String),

    /// WebRTC library error during setup
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error tears down the whole session
    ///
    /// Candidate, relay and feedback errors stay local to one candidate or one
    /// media direction. An unknown message type is a protocol violation that is
    /// logged and skipped.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Candidate(_)
                | Error::Relay(_)
                | Error::Feedback(_)
                | Error::UnknownMessageType(_)
        )
    }

    /// Check if this error comes from the signaling link
    pub fn is_signaling_error(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::ConnectionClosed
                | Error::Decode(_)
                | Error::UnknownMessageType(_)
                | Error::Send(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::WebRtc(e.to_string())
    }
}
