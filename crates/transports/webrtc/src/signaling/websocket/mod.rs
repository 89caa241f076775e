//! WebSocket signaling channel
//!
//! One `{type, payload}` JSON object per frame over a persistent connection.

mod channel;
mod frame;

pub use channel::{
    pump, MessageSink, MessageSource, SignalingChannel, SignalingReceiver, SignalingSender,
};
pub use frame::{FrameKind, WsFrame};
