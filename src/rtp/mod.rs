mod id;
pub use id::{Ssrc, TwccSeq};

mod seq;
pub use seq::{seq_cmp, seq_diff, seq_is_newer};

mod packet;
pub use packet::RtpPacket;

mod rtcp;
pub use rtcp::*;
