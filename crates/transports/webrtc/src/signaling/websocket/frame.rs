//! WebSocket frame adapters
//!
//! The signaling channel is generic over the frame type so the same code runs on
//! tokio-tungstenite streams and on axum upgrades.

/// What a received frame carries, as far as signaling is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Text or binary frame holding one JSON object
    Data(Vec<u8>),
    /// Close frame from the peer
    Close,
    /// Ping, pong or raw frame
    Control,
}

/// A WebSocket message type the signaling channel can read and write
pub trait WsFrame: Send + Sized + 'static {
    /// Build a text frame
    fn text(text: String) -> Self;

    /// Classify a received frame
    fn classify(self) -> FrameKind;
}

impl WsFrame for tokio_tungstenite::tungstenite::Message {
    fn text(text: String) -> Self {
        Self::Text(text)
    }

    fn classify(self) -> FrameKind {
        use tokio_tungstenite::tungstenite::Message;

        match self {
            Message::Text(text) => FrameKind::Data(text.into_bytes()),
            Message::Binary(data) => FrameKind::Data(data),
            Message::Close(_) => FrameKind::Close,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => FrameKind::Control,
        }
    }
}

#[cfg(feature = "axum")]
impl WsFrame for axum::extract::ws::Message {
    fn text(text: String) -> Self {
        Self::Text(text)
    }

    fn classify(self) -> FrameKind {
        use axum::extract::ws::Message;

        match self {
            Message::Text(text) => FrameKind::Data(text.into_bytes()),
            Message::Binary(data) => FrameKind::Data(data),
            Message::Close(_) => FrameKind::Close,
            Message::Ping(_) | Message::Pong(_) => FrameKind::Control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_classify_tungstenite() {
        assert_eq!(
            Message::Text("{}".to_string()).classify(),
            FrameKind::Data(b"{}".to_vec())
        );
        assert_eq!(Message::Binary(vec![1, 2]).classify(), FrameKind::Data(vec![1, 2]));
        assert_eq!(Message::Close(None).classify(), FrameKind::Close);
        assert_eq!(Message::Ping(vec![]).classify(), FrameKind::Control);
    }
}
