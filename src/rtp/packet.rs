use std::time::Duration;

/// An RTP packet with its header already parsed.
///
/// The depacketizer never looks at the RTP header bytes, only at the fields
/// carried here and the payload following the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    /// Payload bytes following the RTP header (and header extensions).
    pub payload: &'a [u8],
    /// RTP marker bit. For video this is the last packet of a frame.
    pub marker: bool,
    /// RTP sequence number.
    pub seq_no: u16,
    /// RTP timestamp.
    pub rtp_time: u32,
    /// Presentation time of the packet, if known.
    ///
    /// Used to timestamp loss notifications created by the depacketizer.
    pub pts: Option<Duration>,
    /// Set when the transport detected a discontinuity before this packet.
    pub discont: bool,
}

impl<'a> RtpPacket<'a> {
    /// Packet with the given payload and default header fields.
    pub fn new(payload: &'a [u8]) -> Self {
        RtpPacket {
            payload,
            marker: false,
            seq_no: 0,
            rtp_time: 0,
            pts: None,
            discont: false,
        }
    }

    /// Set the marker bit.
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Set the RTP sequence number.
    pub fn with_seq_no(mut self, seq_no: u16) -> Self {
        self.seq_no = seq_no;
        self
    }

    /// Set the RTP timestamp.
    pub fn with_rtp_time(mut self, rtp_time: u32) -> Self {
        self.rtp_time = rtp_time;
        self
    }

    /// Set the presentation time.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Mark a discontinuity before this packet.
    pub fn with_discont(mut self, discont: bool) -> Self {
        self.discont = discont;
        self
    }
}
