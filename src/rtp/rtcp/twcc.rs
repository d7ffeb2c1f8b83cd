use std::fmt;

use super::{FeedbackMessageType, RtcpHeader, RtcpPacket};
use super::{RtcpType, Ssrc, TransportType};

/// Size of the fixed part of the TWCC FCI: base seq, status count,
/// reference time and feedback count.
pub(crate) const FCI_HEADER_LEN: usize = 8;

/// Transport Wide Congestion Control feedback packet.
///
/// Describes the arrival status and time of a contiguous range of transport-wide
/// sequence numbers, starting at `base_seq`.
#[derive(Clone, PartialEq, Eq)]
pub struct Twcc {
    /// Sender of this feedback. Mostly irrelevant, but part of RTCP packets.
    pub sender_ssrc: Ssrc,
    /// The media SSRC this report is for.
    pub ssrc: Ssrc,
    /// Start sequence number.
    pub base_seq: u16,
    /// Number of reported statuses.
    pub status_count: u16,
    /// Reference time in multiples of 64ms.
    pub reference_time: u32, // 24 bit
    /// Increasing counter for each TWCC. For deduping.
    pub feedback_count: u8, // counter for each Twcc
    /// Ranges received.
    pub chunks: Vec<PacketChunk>,
    /// Delta times for the received packets, in sequence order.
    pub delta: Vec<Delta>,
}

impl Twcc {
    fn chunks_byte_len(&self) -> usize {
        self.chunks.len() * 2
    }

    fn delta_byte_len(&self) -> usize {
        self.delta.iter().map(|d| d.byte_len()).sum()
    }

    /// Length of the FCI part without padding.
    pub fn fci_len(&self) -> usize {
        FCI_HEADER_LEN + self.chunks_byte_len() + self.delta_byte_len()
    }

    /// Iterate over the statuses of all reported sequence numbers.
    ///
    /// Symbols in the last chunk beyond `status_count` are not included.
    pub fn statuses(&self) -> impl Iterator<Item = (u16, PacketStatus)> + '_ {
        let base_seq = self.base_seq;
        self.chunks
            .iter()
            .flat_map(|c| (0..c.status_capacity()).map(move |i| c.status_at(i)))
            .take(self.status_count as usize)
            .enumerate()
            .map(move |(i, s)| (base_seq.wrapping_add(i as u16), s))
    }
}

impl RtcpPacket for Twcc {
    fn header(&self) -> RtcpHeader {
        RtcpHeader {
            rtcp_type: RtcpType::TransportLayerFeedback,
            feedback_message_type: FeedbackMessageType::TransportFeedback(
                TransportType::TransportWide,
            ),
            words_less_one: (self.length_words() - 1) as u16,
        }
    }

    fn length_words(&self) -> usize {
        // header: 1
        // sender ssrc: 1
        // ssrc: 1
        // base seq + packet status: 1
        // ref time + feedback count: 1
        // chunks byte len + delta byte len + padding

        let mut total = self.chunks_byte_len() + self.delta_byte_len();

        let pad = 4 - total % 4;
        if pad < 4 {
            total += pad;
        }

        5 + total / 4
    }

    fn write_to(&self, buf: &mut [u8]) -> usize {
        self.header().write_to(buf);
        buf[4..8].copy_from_slice(&self.sender_ssrc.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        buf[12..14].copy_from_slice(&self.base_seq.to_be_bytes());
        buf[14..16].copy_from_slice(&self.status_count.to_be_bytes());

        let ref_time = (self.reference_time & 0xff_ffff).to_be_bytes();
        buf[16..19].copy_from_slice(&ref_time[1..4]);
        buf[19] = self.feedback_count;

        let mut total = 20;

        for c in &self.chunks {
            buf[total..total + 2].copy_from_slice(&c.to_wire().to_be_bytes());
            total += 2;
        }

        for d in &self.delta {
            total += d.write_to(&mut buf[total..]);
        }

        let pad = 4 - total % 4;
        if pad < 4 {
            for i in 0..pad {
                buf[total + i] = 0;
            }
            buf[total + pad - 1] = pad as u8;

            total += pad;
            // Toggle padding bit
            buf[0] |= 0b00_1_00000;
        }

        total
    }
}

/// One 16 bit packet status chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketChunk {
    /// Run length chunk. Status repeated for 13 bit length.
    Run(PacketStatus, u16),
    /// Status vector of 14 one bit symbols. Value is the 14 bit symbol list.
    VectorSingle(u16),
    /// Status vector of 7 two bit symbols. Value is the 14 bit symbol list.
    VectorDouble(u16),
}

/// Max length of a run length chunk.
pub const MAX_RUN_LENGTH: u16 = 8191;

impl PacketChunk {
    /// Number of statuses this chunk can describe.
    pub fn status_capacity(&self) -> usize {
        match self {
            PacketChunk::Run(_, n) => *n as usize,
            PacketChunk::VectorSingle(_) => 14,
            PacketChunk::VectorDouble(_) => 7,
        }
    }

    /// Status of the `i`th packet described by this chunk.
    ///
    /// Vector symbols are read through the byte swapped view of the chunk,
    /// which is the same view the chunk writer fills them in.
    pub fn status_at(&self, i: usize) -> PacketStatus {
        let symbol_size = match self {
            PacketChunk::Run(s, _) => return *s,
            PacketChunk::VectorSingle(_) => 1,
            PacketChunk::VectorDouble(_) => 2,
        };

        let swapped = self.to_wire().swap_bytes();

        let mut pos = 21 - i * symbol_size;
        if pos > 15 {
            pos -= 16;
        }
        pos /= symbol_size;

        let mask = (1 << symbol_size) - 1;
        let v = (swapped >> (pos * symbol_size)) & mask;

        PacketStatus::from(v as u8)
    }

    /// The chunk as it goes on the wire (before the big endian conversion).
    pub fn to_wire(&self) -> u16 {
        //     0                   1
        //     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
        //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        //    |T| S |       Run Length        |
        //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        //
        //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        //    |T|S|       symbol list         |
        //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
        match self {
            PacketChunk::Run(s, n) => ((*s as u16) << 13) | (*n & MAX_RUN_LENGTH),
            PacketChunk::VectorSingle(v) => (1 << 15) | (*v & 0x3fff),
            PacketChunk::VectorDouble(v) => (1 << 15) | (1 << 14) | (*v & 0x3fff),
        }
    }
}

impl From<u16> for PacketChunk {
    fn from(x: u16) -> Self {
        let is_vec = (x & 0b1000_0000_0000_0000) > 0;

        if is_vec {
            let is_double = (x & 0b0100_0000_0000_0000) > 0;
            let n = x & 0b0011_1111_1111_1111;
            if is_double {
                PacketChunk::VectorDouble(n)
            } else {
                PacketChunk::VectorSingle(n)
            }
        } else {
            let s: PacketStatus = ((x >> 13) as u8).into();
            let n = x & 0b0001_1111_1111_1111;
            PacketChunk::Run(s, n)
        }
    }
}

/// Receive delta in multiples of 250µs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    /// One byte, 0 to 63.75ms.
    Small(u8),
    /// Two bytes, signed.
    Large(i16),
}

impl Delta {
    fn write_to(&self, buf: &mut [u8]) -> usize {
        match self {
            Delta::Small(v) => {
                buf[0] = *v;
                1
            }
            Delta::Large(v) => {
                buf[..2].copy_from_slice(&v.to_be_bytes());
                2
            }
        }
    }

    /// Size on the wire.
    pub fn byte_len(&self) -> usize {
        match self {
            Delta::Small(_) => 1,
            Delta::Large(_) => 2,
        }
    }

    /// The delta in units of 250µs.
    pub fn units(&self) -> i64 {
        match self {
            Delta::Small(v) => *v as i64,
            Delta::Large(v) => *v as i64,
        }
    }
}

/// Reception status of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketStatus {
    /// Not received, or not yet.
    NotReceived = 0b00,
    /// Received, with a one byte delta.
    ReceivedSmallDelta = 0b01,
    /// Received, with a two byte delta.
    ReceivedLargeOrNegativeDelta = 0b10,
    /// Reserved symbol.
    Unknown = 0b11,
}

impl PacketStatus {
    /// Tells whether this status is followed by a receive delta.
    pub fn has_delta(&self) -> bool {
        matches!(
            self,
            PacketStatus::ReceivedSmallDelta | PacketStatus::ReceivedLargeOrNegativeDelta
        )
    }
}

impl From<PacketStatus> for u8 {
    fn from(val: PacketStatus) -> Self {
        val as u8
    }
}

impl From<u8> for PacketStatus {
    fn from(v: u8) -> Self {
        match v {
            0b00 => Self::NotReceived,
            0b01 => Self::ReceivedSmallDelta,
            0b10 => Self::ReceivedLargeOrNegativeDelta,
            _ => Self::Unknown,
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for Twcc {
    type Error = &'static str;

    /// Parses the packet following the RTCP header: sender SSRC, media SSRC and FCI.
    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < 16 {
            return Err("Less than 16 bytes for start of Twcc");
        }

        let sender_ssrc = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]).into();
        let ssrc = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]).into();
        let base_seq = u16::from_be_bytes([buf[8], buf[9]]);
        let status_count = u16::from_be_bytes([buf[10], buf[11]]);
        let reference_time = u32::from_be_bytes([0, buf[12], buf[13], buf[14]]);
        let feedback_count = buf[15];

        let mut twcc = Twcc {
            sender_ssrc,
            ssrc,
            base_seq,
            status_count,
            reference_time,
            feedback_count,
            chunks: Vec::new(),
            delta: Vec::new(),
        };

        let mut todo = status_count as usize;
        let mut buf = &buf[16..];

        while todo > 0 {
            if buf.len() < 2 {
                return Err("Less than 2 bytes for PacketChunk");
            }

            let chunk = PacketChunk::from(u16::from_be_bytes([buf[0], buf[1]]));
            todo = todo.saturating_sub(chunk.status_capacity());

            twcc.chunks.push(chunk);
            buf = &buf[2..];
        }

        let statuses: Vec<_> = twcc.statuses().map(|(_, s)| s).collect();

        for s in statuses {
            match s {
                PacketStatus::ReceivedSmallDelta => {
                    if buf.is_empty() {
                        return Err("Not enough buf for small delta");
                    }
                    twcc.delta.push(Delta::Small(buf[0]));
                    buf = &buf[1..];
                }
                PacketStatus::ReceivedLargeOrNegativeDelta => {
                    if buf.len() < 2 {
                        return Err("Not enough buf for large delta");
                    }
                    twcc.delta.push(Delta::Large(i16::from_be_bytes([buf[0], buf[1]])));
                    buf = &buf[2..];
                }
                _ => {}
            }
        }

        Ok(twcc)
    }
}

impl fmt::Debug for Twcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Twcc")
            .field("sender_ssrc", &self.sender_ssrc)
            .field("ssrc", &self.ssrc)
            .field("base_seq", &self.base_seq)
            .field("status_count", &self.status_count)
            .field("reference_time", &self.reference_time)
            .field("feedback_count", &self.feedback_count)
            .field("chunks", &self.chunks)
            .field("delta", &self.delta.len())
            .finish()
    }
}
