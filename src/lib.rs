//! Loss resilience for RTP video transport.
//!
//! Two independent parts:
//!
//! * [`Vp8Depacketizer`] reassembles VP8 frames from RTP packets, tracks the
//!   picture id sequence, and tells downstream about missing frames.
//! * [`TwccManager`][twcc::TwccManager] keeps track of transport wide sequence
//!   numbers. It encodes RTCP feedback about received packets, and correlates
//!   feedback from the remote peer with packets we sent.
//!
//! This is a [Sans I/O][sansio] library. Nothing here touches a socket, spawns a
//! thread or reads a clock. Inputs are pushed with the time they happened, and
//! results are polled from output queues.
//!
//! ```
//! use rtp_resilience::rtp::RtpPacket;
//! use rtp_resilience::{Vp8Config, Vp8Depacketizer, Vp8Output};
//!
//! let mut depack = Vp8Depacketizer::new(Vp8Config::new());
//!
//! // A keyframe in a single packet, picture id 24.
//! let payload = [
//!     0x90, 0x80, 0x18, 0xf0, 0x07, 0x00, 0x9d, 0x01, 0x2a, 0xb0, 0x00, 0x90, 0x00,
//! ];
//! depack.push(&RtpPacket::new(&payload).with_marker(true));
//!
//! assert!(matches!(depack.poll_output(), Some(Vp8Output::FormatChanged(_))));
//! assert!(matches!(depack.poll_output(), Some(Vp8Output::Frame(f)) if f.keyframe));
//! ```
//!
//! [sansio]: https://sans-io.readthedocs.io

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![warn(missing_docs)]

#[macro_use]
extern crate tracing;

use thiserror::Error;

mod config;
pub use config::{TwccConfig, Vp8Config};

mod packet;
pub use packet::{LossEvent, PictureId, Vp8Depacketizer};
pub use packet::{Vp8Format, Vp8Frame, Vp8Output};
pub use packet::{Vp8FrameHeader, Vp8PayloadDescriptor};

#[path = "rtp/mod.rs"]
mod rtp_;

/// Low level RTP access.
pub mod rtp {
    /// Feedback for RTP.
    pub mod rtcp {
        pub use crate::rtp_::{Delta, PacketChunk, PacketStatus, Twcc, MAX_RUN_LENGTH};
        pub use crate::rtp_::{FeedbackMessageType, TransportType};
        pub use crate::rtp_::{RtcpHeader, RtcpPacket, RtcpType};
    }

    pub use crate::rtp_::{seq_cmp, seq_diff, seq_is_newer};
    pub use crate::rtp_::{RtpPacket, Ssrc, TwccSeq};
}

pub mod twcc;

/// Various error types.
pub mod error {
    pub use crate::packet::PacketError;
    pub use crate::twcc::TwccError;
}

/// Errors for the whole crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Depacketization errors.
    #[error("{0}")]
    Packet(#[from] error::PacketError),

    /// TWCC feedback errors.
    #[error("{0}")]
    Twcc(#[from] error::TwccError),
}
