#![allow(clippy::unusual_byte_groupings)]

mod header;
pub(crate) use header::LEN_HEADER;
pub use header::{RtcpHeader, RtcpType};

mod fmt;
pub use fmt::{FeedbackMessageType, TransportType};

mod twcc;
pub(crate) use twcc::FCI_HEADER_LEN;
pub use twcc::{Delta, PacketChunk, PacketStatus, Twcc, MAX_RUN_LENGTH};

use super::Ssrc;

/// An RTCP packet that can be serialized.
pub trait RtcpPacket {
    /// The RTCP header describing this packet.
    fn header(&self) -> RtcpHeader;

    /// Length of entire RTCP packet (including header) in words (4 bytes).
    fn length_words(&self) -> usize;

    /// Write this packet to the buffer.
    ///
    /// Panics if the buffer doesn't have capacity to hold length_words * 4 bytes.
    fn write_to(&self, buf: &mut [u8]) -> usize;

    /// Serialize into a new buffer.
    fn to_vec(&self) -> Vec<u8> {
        let mut buf = vec![0; self.length_words() * 4];
        let n = self.write_to(&mut buf);
        buf.truncate(n);
        buf
    }
}
