//! Transport wide congestion control (TWCC) feedback.
//!
//! The receive side records the arrival time of every packet carrying a
//! transport-wide sequence number and periodically encodes the arrivals into
//! RTCP feedback. The send side keeps a history of sent packets, and joins parsed
//! feedback from the remote peer with that history.
//!
//! [`TwccManager`] bundles both sides. Like the rest of this crate it does no IO;
//! feedback is queued and polled with [`TwccManager::poll_feedback`].

use std::time::Duration;

use thiserror::Error;

use crate::config::TwccConfig;
use crate::rtp_::{FeedbackMessageType, RtcpHeader, RtcpPacket, RtcpType};
use crate::rtp_::{Ssrc, TransportType, TwccSeq, LEN_HEADER};

mod chunk;
pub use chunk::{read_chunks, write_chunks, ChunkBitWriter};

mod recv;
pub use recv::TwccRecvRegister;

mod parse;
pub use parse::{TwccPacketInfo, TwccParser, TwccReport};

mod send;
pub use send::{TwccSendRecord, TwccSendRegister};

/// Receive deltas are in multiples of 250µs.
pub(crate) const DELTA_UNIT_MICROS: i64 = 250;

/// Reference time is in multiples of 64ms.
pub(crate) const REF_TIME_UNIT_MICROS: i64 = 64_000;

/// Span of sequence numbers from which a batch with losses is reported
/// without waiting for a marker bit.
pub(crate) const MANY_LOST_MIN_SPAN: usize = 30;

/// RTCP header + sender SSRC + media SSRC + fixed FCI part.
const FEEDBACK_OVERHEAD: usize = 20;

/// Worst case padding plus one spare chunk.
const FEEDBACK_SLACK: usize = 3 + 2;

/// One chunk of seven 2-bit symbols and seven 2-byte deltas.
const BYTES_PER_SEVEN: usize = 2 + 7 * 2;

/// Errors arising in TWCC feedback handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TwccError {
    /// The FCI is shorter than the fixed header and one chunk.
    #[error("TWCC FCI too short: {0} bytes")]
    ShortFci(usize),

    /// The RTCP packet is shorter than its header says, or than the minimum.
    #[error("RTCP packet too short: {0} bytes")]
    ShortRtcp(usize),

    /// Not an RTCP transport layer feedback of the transport-wide kind.
    #[error("RTCP packet is not TWCC feedback")]
    NotTwcc,

    /// Padding count is zero or larger than the packet.
    #[error("Bad RTCP padding")]
    BadPadding,

    /// Configured MTU can't fit a single feedback.
    #[error("MTU too small for TWCC feedback: {0}")]
    MtuTooSmall(usize),
}

/// Max number of packet statuses in one feedback that is sure to fit in `mtu`.
pub fn max_packets_for_mtu(mtu: usize) -> Result<usize, TwccError> {
    let room = mtu
        .checked_sub(FEEDBACK_OVERHEAD + FEEDBACK_SLACK)
        .ok_or(TwccError::MtuTooSmall(mtu))?;

    let max = room / BYTES_PER_SEVEN * 7;
    if max == 0 {
        return Err(TwccError::MtuTooSmall(mtu));
    }

    Ok(max)
}

/// Send and receive side TWCC bookkeeping for one transport.
///
/// Calls from the receive path (`record_receipt`), send path (`send_packet`) and
/// feedback path (`parse_feedback`) mutate shared state. A multi-threaded host
/// must serialize access, for instance with one lock around the manager.
#[derive(Debug)]
pub struct TwccManager {
    config: TwccConfig,
    recv: TwccRecvRegister,
    send: TwccSendRegister,
    parser: TwccParser,
}

impl TwccManager {
    /// Creates a manager from config.
    ///
    /// Fails if the MTU is too small for even one feedback chunk.
    pub fn new(config: TwccConfig) -> Result<Self, TwccError> {
        let recv = TwccRecvRegister::new(config.mtu(), config.sender_ssrc())?;
        let send = TwccSendRegister::new(config.send_history());

        debug!(
            "Twcc manager mtu: {} max packets: {}",
            config.mtu(),
            recv.max_packets()
        );

        Ok(TwccManager {
            config,
            recv,
            send,
            parser: TwccParser::new(),
        })
    }

    /// The config this manager was created with.
    pub fn config(&self) -> &TwccConfig {
        &self.config
    }

    /// Max number of packet statuses a feedback may hold with the configured MTU.
    pub fn max_packets_per_feedback(&self) -> usize {
        self.recv.max_packets()
    }

    /// Record the arrival of a packet with transport-wide sequence number `seq`.
    ///
    /// `arrival` is time on a monotonic clock chosen by the caller.
    pub fn record_receipt(&mut self, seq: u16, arrival: Duration, ssrc: Ssrc, marker: bool) {
        self.recv.record_receipt(seq, arrival, ssrc, marker);
    }

    /// Build feedback for any arrivals not yet reported, regardless of triggers.
    ///
    /// For periodic flushing driven by the caller.
    pub fn flush_feedback(&mut self) {
        self.recv.build_feedback();
    }

    /// Poll the next serialized RTCP feedback packet.
    pub fn poll_feedback(&mut self) -> Option<Vec<u8>> {
        let twcc = self.recv.poll_feedback()?;
        trace!("Poll twcc feedback: {:?}", twcc);
        Some(twcc.to_vec())
    }

    /// Allocate the next transport-wide sequence number for a packet sent now.
    pub fn send_packet(&mut self, send_time: Duration, size: usize) -> TwccSeq {
        self.send.send_packet(send_time, size)
    }

    /// Record a send with an externally allocated sequence number.
    pub fn record_send(&mut self, seq: TwccSeq, send_time: Duration, size: usize) {
        self.send.record_send(seq, send_time, size);
    }

    /// Attach a socket level send timestamp to a recorded send.
    ///
    /// Returns false when the send isn't in the history.
    pub fn attach_socket_timestamp(&mut self, seq: TwccSeq, ts: Duration) -> bool {
        self.send.attach_socket_timestamp(*seq, ts)
    }

    /// A recorded send, if still in the history.
    pub fn send_record(&self, seq: TwccSeq) -> Option<&TwccSendRecord> {
        self.send.get(*seq)
    }

    /// Parse the FCI part of received TWCC feedback.
    pub fn parse_fci(&mut self, fci: &[u8]) -> Result<TwccReport, TwccError> {
        self.parser.parse_fci(fci, &mut self.send)
    }

    /// Parse a complete received RTCP TWCC feedback packet.
    pub fn parse_feedback(&mut self, buf: &[u8]) -> Result<TwccReport, TwccError> {
        let fci = split_fci(buf)?;
        self.parse_fci(fci)
    }

    /// Forget all state. Safe to call at any time.
    pub fn reset(&mut self) {
        debug!("Reset twcc manager");
        self.recv.reset();
        self.send.reset();
        self.parser.reset();
    }
}

/// Validate an RTCP TWCC feedback packet and return its FCI.
pub fn split_fci(buf: &[u8]) -> Result<&[u8], TwccError> {
    // header + sender ssrc + media ssrc
    const FCI_START: usize = LEN_HEADER + 8;

    if buf.len() < FCI_START {
        return Err(TwccError::ShortRtcp(buf.len()));
    }

    let header: RtcpHeader = buf.try_into().map_err(|e| {
        debug!("Bad RTCP header: {}", e);
        TwccError::NotTwcc
    })?;

    let is_twcc = header.rtcp_type() == RtcpType::TransportLayerFeedback
        && header.feedback_message_type()
            == FeedbackMessageType::TransportFeedback(TransportType::TransportWide);
    if !is_twcc {
        return Err(TwccError::NotTwcc);
    }

    let len = header.length_bytes();
    if len < FCI_START || len > buf.len() {
        return Err(TwccError::ShortRtcp(buf.len()));
    }
    let buf = &buf[..len];

    let has_padding = buf[0] & 0b00_1_00000 > 0;
    let unpadded = if has_padding {
        let pad = buf[len - 1] as usize;
        if pad == 0 || pad > len - FCI_START {
            return Err(TwccError::BadPadding);
        }
        len - pad
    } else {
        len
    };

    Ok(&buf[FCI_START..unpadded])
}
