//! Depacketization of VP8 RTP payloads.

mod error;
pub use error::PacketError;

mod picture_id;
pub use picture_id::PictureId;

mod loss;
pub use loss::LossEvent;

mod vp8;
pub use vp8::{Vp8FrameHeader, Vp8PayloadDescriptor};

mod vp8_depack;
pub use vp8_depack::{Vp8Depacketizer, Vp8Format, Vp8Frame, Vp8Output};

/// Byte cursor over a payload. The `usize` is the offset in bits.
pub(crate) trait BitRead {
    fn remaining(&self) -> usize;
    fn get_offset(&self) -> usize;
    fn get_u8(&mut self) -> Option<u8>;
}

impl BitRead for (&[u8], usize) {
    #[inline(always)]
    fn remaining(&self) -> usize {
        (self.0.len() * 8).saturating_sub(self.1)
    }

    #[inline(always)]
    fn get_offset(&self) -> usize {
        self.1 / 8
    }

    #[inline(always)]
    fn get_u8(&mut self) -> Option<u8> {
        if self.remaining() < 8 {
            return None;
        }

        let offs = self.1 / 8;
        let shift = (self.1 % 8) as u32;
        self.1 += 8;

        let mut n = self.0[offs];

        if shift > 0 {
            n <<= shift;
            n |= self.0[offs + 1] >> (8 - shift)
        }

        Some(n)
    }
}
