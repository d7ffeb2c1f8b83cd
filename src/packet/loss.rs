use std::time::Duration;

/// Notification that media data is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossEvent {
    /// Presentation time of the missing data.
    pub timestamp: Duration,
    /// Duration of the missing data, zero if unknown.
    pub duration: Duration,
    /// Set when no packet was lost, but information is missing anyway.
    ///
    /// The depacketizer sets this on the events it creates from frame level
    /// gaps. Events from the transport mean actual packet loss.
    pub no_packet_loss: bool,
}

impl LossEvent {
    /// Loss of one or more packets, as detected by the transport.
    pub fn packet_loss(timestamp: Duration, duration: Duration) -> Self {
        LossEvent {
            timestamp,
            duration,
            no_packet_loss: false,
        }
    }

    pub(crate) fn missing_frame(timestamp: Duration) -> Self {
        LossEvent {
            timestamp,
            duration: Duration::ZERO,
            no_packet_loss: true,
        }
    }
}

/// A single slot for a transport loss event, held back pending a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum HeldLoss {
    #[default]
    Empty,
    Held(LossEvent),
}

impl HeldLoss {
    /// Hold `event`, replacing any previously held.
    pub fn hold(&mut self, event: LossEvent) {
        if let HeldLoss::Held(prev) = self {
            trace!("Replace held loss event: {:?}", prev);
        }
        *self = HeldLoss::Held(event);
    }

    pub fn take(&mut self) -> Option<LossEvent> {
        match std::mem::take(self) {
            HeldLoss::Empty => None,
            HeldLoss::Held(e) => Some(e),
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, HeldLoss::Held(_))
    }
}
