//! Signaling wire types
//!
//! One JSON object per frame:
//!
//! ```text
//! { "type": "offer" | "answer" | "candidate", "payload": "<string>" }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signaling message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// SDP offer from the browser
    Offer,
    /// SDP answer from the relay
    Answer,
    /// One ICE candidate string
    Candidate,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::Candidate => "candidate",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "offer" => Ok(MessageKind::Offer),
            "answer" => Ok(MessageKind::Answer),
            "candidate" => Ok(MessageKind::Candidate),
            other => Err(Error::UnknownMessageType(other.to_string())),
        }
    }
}

/// A decoded signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingMessage {
    /// Message kind, serialized as `type`
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// SDP text for offer/answer, candidate string for candidate
    pub payload: String,
}

/// Frame layout before the `type` field is checked against [`MessageKind`]
#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: String,
}

impl SignalingMessage {
    pub fn new(kind: MessageKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(MessageKind::Offer, sdp)
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(MessageKind::Answer, sdp)
    }

    pub fn candidate(candidate: impl Into<String>) -> Self {
        Self::new(MessageKind::Candidate, candidate)
    }

    /// Decode one frame
    ///
    /// Malformed JSON or a missing `type` is [`Error::Decode`]; a well-formed
    /// frame with an unrecognized `type` is [`Error::UnknownMessageType`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawMessage = serde_json::from_slice(bytes)
            .map_err(|e| Error::Decode(format!("Failed to parse signaling frame: {}", e)))?;
        let kind = raw.kind.parse()?;
        Ok(Self {
            kind,
            payload: raw.payload,
        })
    }

    /// Encode to the JSON text sent in one frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Send(format!("Failed to encode signaling message: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_decode_offer() {
        let msg = SignalingMessage::decode(br#"{"type":"offer","payload":"v=0\r\n"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Offer);
        assert_eq!(msg.payload, "v=0\r\n");
    }

    #[test]
    fn test_decode_candidate() {
        let frame = br#"{"type":"candidate","payload":"candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host"}"#;
        let msg = SignalingMessage::decode(frame).unwrap();
        assert_eq!(msg.kind, MessageKind::Candidate);
        assert!(msg.payload.starts_with("candidate:1"));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = SignalingMessage::decode(br#"{"type":"bye","payload":""}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownMessageType(ref t) if t == "bye"));
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = SignalingMessage::decode(b"{\"type\": \"offer\", ").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.is_session_fatal());
    }

    #[test]
    fn test_decode_missing_type() {
        let err = SignalingMessage::decode(br#"{"payload":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_missing_payload_is_empty() {
        let msg = SignalingMessage::decode(br#"{"type":"candidate"}"#).unwrap();
        assert_eq!(msg.payload, "");
    }

    #[test]
    fn test_answer_wire_shape() {
        let json = SignalingMessage::answer("v=0").to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "answer");
        assert_eq!(value["payload"], "v=0");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("candidate".parse::<MessageKind>().unwrap(), MessageKind::Candidate);
        assert!("Offer".parse::<MessageKind>().is_err());
        assert_eq!(MessageKind::Answer.to_string(), "answer");
    }
}
