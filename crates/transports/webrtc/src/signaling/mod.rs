//! Signaling for the echo relay
//!
//! - `protocol`: the `{type, payload}` JSON wire messages
//! - `websocket`: the framed channel carrying them and its receiver pump

pub mod protocol;
pub mod websocket;

pub use protocol::{MessageKind, SignalingMessage};
pub use websocket::{
    pump, FrameKind, MessageSink, MessageSource, SignalingChannel, SignalingReceiver,
    SignalingSender, WsFrame,
};
