//! Media tracks and the per-track echo relay

pub mod relay;
pub mod tracks;

pub use relay::{route_packet, RelayExit, RelayReport, Route, TrackRelay};
pub use tracks::{
    InboundTrack, LocalTrackPublisher, LocalTrackRequest, LocalTrackSlot, LocalTracks, MediaKind,
    OutboundTrack, RtpPacket, TrackDescriptor,
};
