//! Synthetic RTP streams for relay testing

use bytes::Bytes;
use rtc_echo_webrtc::media::RtpPacket;
use webrtc::rtp::header::Header;

/// Produces RTP packets for one remote stream
pub struct RtpGenerator {
    payload_type: u8,
    ssrc: u32,
    sequence_number: u16,
    timestamp: u32,

    /// Timestamp increment per packet (3000 = 30fps video at 90kHz)
    timestamp_step: u32,
}

impl RtpGenerator {
    /// VP8-like stream at 90kHz
    pub fn video(payload_type: u8, ssrc: u32) -> Self {
        Self::new(payload_type, ssrc, 3000)
    }

    /// Opus-like stream with 20ms frames at 48kHz
    pub fn audio(payload_type: u8, ssrc: u32) -> Self {
        Self::new(payload_type, ssrc, 960)
    }

    pub fn new(payload_type: u8, ssrc: u32, timestamp_step: u32) -> Self {
        Self {
            payload_type,
            ssrc,
            sequence_number: 1,
            timestamp: 0,
            timestamp_step,
        }
    }

    /// Continue the stream from `sequence_number`
    pub fn starting_at(mut self, sequence_number: u16) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Next packet; the payload repeats the low byte of the sequence number
    pub fn next_packet(&mut self) -> RtpPacket {
        let packet = RtpPacket {
            header: Header {
                version: 2,
                marker: true,
                payload_type: self.payload_type,
                sequence_number: self.sequence_number,
                timestamp: self.timestamp,
                ssrc: self.ssrc,
                ..Default::default()
            },
            payload: Bytes::from(vec![self.sequence_number as u8; 32]),
        };

        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.timestamp_step);
        packet
    }

    /// Next `count` packets
    pub fn take(&mut self, count: usize) -> Vec<RtpPacket> {
        (0..count).map(|_| self.next_packet()).collect()
    }
}
