/// Subtype of an RTCP packet, carried in the 5 bit count/format field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMessageType {
    /// When packet type is TransportLayerFeedback
    TransportFeedback(TransportType),
    /// Any other value in the format field.
    Other(u8),
}

impl FeedbackMessageType {
    /// Value of the 5 bit format field.
    pub fn as_u8(&self) -> u8 {
        match self {
            FeedbackMessageType::TransportFeedback(v) => *v as u8,
            FeedbackMessageType::Other(v) => *v & 0b000_11111,
        }
    }
}

/// Transport layer feedback formats (RFC 4585).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Generic NACK.
    Nack = 1,
    /// Transport-wide congestion control feedback.
    // https://tools.ietf.org/html/draft-holmer-rmcat-transport-wide-cc-extensions-01
    TransportWide = 15,
}

impl TransportType {
    /// Format field value to type, if known.
    pub fn from_u8(v: u8) -> Option<Self> {
        use TransportType::*;
        match v {
            1 => Some(Nack),
            15 => Some(TransportWide),
            _ => {
                trace!("Unrecognized TransportSpecificFeedback type: {}", v);
                None
            }
        }
    }
}
