#![allow(unused)]
use std::sync::Once;
use std::time::Duration;

use rtp_resilience::rtp::RtpPacket;
use rtp_resilience::{LossEvent, Vp8Config, Vp8Depacketizer, Vp8Output};

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

/// A 176x144 keyframe, as found in a captured stream.
pub const INTRA: &[u8] = &[
    0xf0, 0x07, 0x00, 0x9d, 0x01, 0x2a, 0xb0, 0x00, 0x90, 0x00, 0x06, 0x47, 0x08, 0x85, 0x85,
    0x88, 0x99, 0x84, 0x88, 0x21,
];

/// An inter frame following [`INTRA`].
pub const INTER: &[u8] = &[
    0x31, 0x02, 0x00, 0x19, 0x11, 0xbc, 0x00, 0x18, 0x00, 0x18, 0x58, 0x2f, 0xf4, 0x00, 0x08,
    0x80, 0x43, 0x98, 0x06, 0x00,
];

/// Picture id field of a VP8 payload descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicId {
    None,
    Narrow(u8),
    Wide(u16),
}

/// Payload descriptor for the first packet of a frame, followed by `vp8`.
pub fn vp8_payload(pic_id: PicId, vp8: &[u8]) -> Vec<u8> {
    let mut v = match pic_id {
        PicId::None => vec![0x90, 0x00],
        PicId::Narrow(n) => vec![0x90, 0x80, n & 0x7f],
        PicId::Wide(n) => {
            let [hi, lo] = (n & 0x7fff).to_be_bytes();
            vec![0x90, 0x80, 0x80 | hi, lo]
        }
    };
    v.extend_from_slice(vp8);
    v
}

/// Payload descriptor for a packet continuing a frame.
pub fn vp8_continuation(pic_id: PicId, vp8: &[u8]) -> Vec<u8> {
    let mut v = vp8_payload(pic_id, vp8);
    // Clear the S bit.
    v[0] &= !0x10;
    v
}

pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Depacketizer driven with packets 33ms apart by sequence number.
pub struct TestDepack {
    pub depack: Vp8Depacketizer,
}

impl TestDepack {
    pub fn new(config: Vp8Config) -> Self {
        init_log();
        TestDepack {
            depack: Vp8Depacketizer::new(config),
        }
    }

    pub fn push(&mut self, seq: u16, payload: &[u8], marker: bool) {
        let p = RtpPacket::new(payload)
            .with_seq_no(seq)
            .with_marker(marker)
            .with_rtp_time(seq as u32 * 3000)
            .with_pts(ms(seq as u64 * 33));
        self.depack.push(&p);
    }

    /// A single packet frame.
    pub fn push_frame(&mut self, seq: u16, pic_id: PicId, keyframe: bool) {
        let vp8 = if keyframe { INTRA } else { INTER };
        self.push(seq, &vp8_payload(pic_id, vp8), true);
    }

    /// Transport reports `seq` as lost.
    pub fn lose(&mut self, seq: u16) -> LossEvent {
        let event = LossEvent::packet_loss(ms(seq as u64 * 33), ms(33));
        self.depack.handle_packet_lost(event);
        event
    }

    pub fn drain(&mut self) -> Vec<Vp8Output> {
        std::iter::from_fn(|| self.depack.poll_output()).collect()
    }
}

pub fn lost_events(out: &[Vp8Output]) -> Vec<LossEvent> {
    out.iter()
        .filter_map(|o| match o {
            Vp8Output::PacketLost(e) => Some(*e),
            _ => None,
        })
        .collect()
}

pub fn frames(out: &[Vp8Output]) -> usize {
    out.iter()
        .filter(|o| matches!(o, Vp8Output::Frame(_)))
        .count()
}
