use thiserror::Error;

/// Errors arising in depacketization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The payload is too short for the descriptor it declares.
    #[error("Packet is too short: needs more than {needed} bytes, got {len}")]
    ShortPacket {
        /// Bytes needed by the payload descriptor.
        needed: usize,
        /// Length of the payload.
        len: usize,
    },

    /// The reassembled frame is too short for the VP8 frame header.
    #[error("Frame is too short: {0} bytes")]
    ShortFrame(usize),
}
