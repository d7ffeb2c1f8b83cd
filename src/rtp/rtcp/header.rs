use super::{FeedbackMessageType, TransportType};

pub(crate) const LEN_HEADER: usize = 4;

/// Common header of all RTCP packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub(crate) rtcp_type: RtcpType,
    pub(crate) feedback_message_type: FeedbackMessageType,
    pub(crate) words_less_one: u16,
}

impl RtcpHeader {
    /// Type of RTCP packet. This is further divided into subtypes by
    /// `feedback_message_type`.
    pub fn rtcp_type(&self) -> RtcpType {
        self.rtcp_type
    }

    /// Subtype of RTCP message.
    pub fn feedback_message_type(&self) -> FeedbackMessageType {
        self.feedback_message_type
    }

    /// Length of entire RTCP packet (including header) in words (4 bytes).
    pub fn length_words(&self) -> usize {
        self.words_less_one as usize + 1
    }

    /// Length of entire RTCP packet (including header) in bytes.
    pub fn length_bytes(&self) -> usize {
        self.length_words() * 4
    }

    /// Write the 4 header bytes. The padding bit is left unset.
    pub(crate) fn write_to(&self, buf: &mut [u8]) -> usize {
        buf[0] = 0b10_0_00000 | self.feedback_message_type.as_u8();
        buf[1] = self.rtcp_type as u8;
        buf[2..4].copy_from_slice(&self.words_less_one.to_be_bytes());
        LEN_HEADER
    }
}

impl<'a> TryFrom<&'a [u8]> for RtcpHeader {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < LEN_HEADER {
            return Err("Less than 4 bytes for RTCP header");
        }

        let version = buf[0] >> 6;
        if version != 2 {
            return Err("RTCP version is not 2");
        }

        let rtcp_type: RtcpType = buf[1].try_into().map_err(|_| "Unknown RTCP type")?;
        let fmt = buf[0] & 0b000_11111;

        let feedback_message_type = match rtcp_type {
            RtcpType::TransportLayerFeedback => match TransportType::from_u8(fmt) {
                Some(t) => FeedbackMessageType::TransportFeedback(t),
                None => FeedbackMessageType::Other(fmt),
            },
            _ => FeedbackMessageType::Other(fmt),
        };

        let words_less_one = u16::from_be_bytes([buf[2], buf[3]]);

        Ok(RtcpHeader {
            rtcp_type,
            feedback_message_type,
            words_less_one,
        })
    }
}

/// Kind of RTCP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcpType {
    /// RTCP_PT_SR
    SenderReport = 200,

    /// RTCP_PT_RR
    ReceiverReport = 201,

    /// RTCP_PT_SDES
    SourceDescription = 202,

    /// RTCP_PT_BYE
    Goodbye = 203,

    /// RTCP_PT_APP
    ApplicationDefined = 204,

    /// RTCP_PT_RTPFB
    // https://tools.ietf.org/html/rfc4585
    TransportLayerFeedback = 205,

    /// RTCP_PT_PSFB
    // https://tools.ietf.org/html/rfc4585
    PayloadSpecificFeedback = 206,

    /// RTCP_PT_XR
    ExtendedReport = 207,
}

impl TryFrom<u8> for RtcpType {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        use RtcpType::*;
        match v {
            200 => Ok(SenderReport),
            201 => Ok(ReceiverReport),
            202 => Ok(SourceDescription),
            203 => Ok(Goodbye),
            204 => Ok(ApplicationDefined),
            205 => Ok(TransportLayerFeedback),
            206 => Ok(PayloadSpecificFeedback),
            207 => Ok(ExtendedReport),
            _ => {
                trace!("Unrecognized RTCP type: {}", v);
                Err(())
            }
        }
    }
}
