use super::{BitRead, PacketError, PictureId};

/// Size of the VP8 uncompressed data chunk at the start of a keyframe.
const VP8_FRAME_HEADER_SIZE: usize = 10;

/// VP8 payload descriptor, the codec specific header first in each RTP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vp8PayloadDescriptor {
    /// Set if this frame can be discarded without affecting other frames.
    pub non_reference: bool,
    /// Start of a VP8 partition.
    pub start_of_partition: bool,
    /// Partition index.
    pub partition_id: u8,
    /// Picture id, if present.
    pub picture_id: Option<PictureId>,
    /// Temporal level zero index, if present.
    pub tl0_pic_idx: Option<u8>,
    /// The TID/Y/KEYIDX byte, if present.
    pub tid_y_keyidx: Option<u8>,
    /// Whether the TID (temporal layer index) field is in use.
    pub temporally_scaled: bool,
    /// Number of descriptor bytes preceding the VP8 payload.
    pub header_len: usize,
}

impl Vp8PayloadDescriptor {
    /// Parse the payload descriptor of an RTP payload.
    ///
    /// Fails unless at least one byte of VP8 data follows the descriptor.
    pub fn parse(payload: &[u8]) -> Result<Self, PacketError> {
        // VP8 Payload Descriptor
        // https://datatracker.ietf.org/doc/html/rfc7741#section-4.2
        //
        //    0 1 2 3 4 5 6 7                      0 1 2 3 4 5 6 7
        //    +-+-+-+-+-+-+-+-+                   +-+-+-+-+-+-+-+-+
        //    |X|R|N|S|R| PID | (REQUIRED)        |X|R|N|S|R| PID | (REQUIRED)
        //    +-+-+-+-+-+-+-+-+                   +-+-+-+-+-+-+-+-+
        // X: |I|L|T|K| RSV   | (OPTIONAL)   X:   |I|L|T|K| RSV   | (OPTIONAL)
        //    +-+-+-+-+-+-+-+-+                   +-+-+-+-+-+-+-+-+
        // I: |M| PictureID   | (OPTIONAL)   I:   |M| PictureID   | (OPTIONAL)
        //    +-+-+-+-+-+-+-+-+                   +-+-+-+-+-+-+-+-+
        // L: |   tl0picidx   | (OPTIONAL)        |   PictureID   |
        //    +-+-+-+-+-+-+-+-+                   +-+-+-+-+-+-+-+-+
        //T/K:|tid|Y| KEYIDX  | (OPTIONAL)   L:   |   tl0picidx   | (OPTIONAL)
        //    +-+-+-+-+-+-+-+-+                   +-+-+-+-+-+-+-+-+
        //                                    T/K:|tid|Y| KEYIDX  | (OPTIONAL)
        //                                        +-+-+-+-+-+-+-+-+

        let len = payload.len();
        let short = |needed: usize| PacketError::ShortPacket { needed, len };

        // At least one descriptor byte and one VP8 byte.
        if len < 2 {
            return Err(short(1));
        }

        let mut reader = (payload, 0);

        let b = reader.get_u8().ok_or_else(|| short(1))?;
        let x = b & 0x80 > 0;

        let mut desc = Vp8PayloadDescriptor {
            non_reference: b & 0x20 > 0,
            start_of_partition: b & 0x10 > 0,
            partition_id: b & 0x07,
            picture_id: None,
            tl0_pic_idx: None,
            tid_y_keyidx: None,
            temporally_scaled: false,
            header_len: 1,
        };

        if x {
            let ext = reader.get_u8().ok_or_else(|| short(2))?;

            let i = ext & 0x80 > 0;
            let l = ext & 0x40 > 0;
            let t = ext & 0x20 > 0;
            let k = ext & 0x10 > 0;

            if i {
                let b = reader
                    .get_u8()
                    .ok_or_else(|| short(reader.get_offset() + 1))?;

                // M == 1, picture id is 15 bits
                let picture_id = if b & 0x80 > 0 {
                    let lo = reader
                        .get_u8()
                        .ok_or_else(|| short(reader.get_offset() + 1))?;
                    PictureId::wide(u16::from_be_bytes([b, lo]))
                } else {
                    PictureId::narrow(b)
                };
                desc.picture_id = Some(picture_id);
            }

            if l {
                let v = reader
                    .get_u8()
                    .ok_or_else(|| short(reader.get_offset() + 1))?;
                desc.tl0_pic_idx = Some(v);
            }

            if t || k {
                let v = reader
                    .get_u8()
                    .ok_or_else(|| short(reader.get_offset() + 1))?;
                desc.tid_y_keyidx = Some(v);
                desc.temporally_scaled = t;
            }
        }

        desc.header_len = reader.get_offset();

        if desc.header_len >= len {
            return Err(short(desc.header_len));
        }

        Ok(desc)
    }

    /// First packet of a frame: start of partition with partition index 0.
    pub fn is_frame_start(&self) -> bool {
        self.start_of_partition && self.partition_id == 0
    }
}

/// The first bytes of a VP8 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vp8FrameHeader {
    /// Intra frame, decodable on its own.
    pub keyframe: bool,
    /// VP8 version/profile, 0-3.
    pub profile: u8,
    /// Width in pixels. Only set for keyframes.
    pub width: u16,
    /// Height in pixels. Only set for keyframes.
    pub height: u16,
}

impl Vp8FrameHeader {
    /// Parse the header of a complete frame.
    pub fn parse(frame: &[u8]) -> Result<Self, PacketError> {
        // RFC 6386 9.1
        //
        //  0 1 2 3 4 5 6 7
        // +-+-+-+-+-+-+-+-+
        // |Size0|H| VER |P|
        // +-+-+-+-+-+-+-+-+
        // |     Size1     |
        // +-+-+-+-+-+-+-+-+
        // |     Size2     |
        // +-+-+-+-+-+-+-+-+
        //
        // For keyframes followed by start code 9d 01 2a and 14 bit little endian
        // width and height, each with a 2 bit scale.
        if frame.len() < VP8_FRAME_HEADER_SIZE {
            return Err(PacketError::ShortFrame(frame.len()));
        }

        let b0 = frame[0];
        let keyframe = b0 & 0x01 == 0;
        let profile = (b0 & 0x0e) >> 1;

        let (width, height) = if keyframe {
            (
                u16::from_le_bytes([frame[6], frame[7]]) & 0x3fff,
                u16::from_le_bytes([frame[8], frame[9]]) & 0x3fff,
            )
        } else {
            (0, 0)
        };

        Ok(Vp8FrameHeader {
            keyframe,
            profile,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_extension() {
        let d = Vp8PayloadDescriptor::parse(&[0x10, 0x01]).unwrap();
        assert!(d.is_frame_start());
        assert_eq!(d.picture_id, None);
        assert_eq!(d.header_len, 1);
    }

    #[test]
    fn picture_id_7_bit() {
        let d = Vp8PayloadDescriptor::parse(&[0x90, 0x80, 0x18, 0xf0]).unwrap();
        assert!(d.is_frame_start());
        assert_eq!(d.picture_id, Some(PictureId::narrow(24)));
        assert_eq!(d.header_len, 3);
    }

    #[test]
    fn picture_id_15_bit() {
        let d = Vp8PayloadDescriptor::parse(&[0x90, 0x80, 0x98, 0xc0, 0xf0]).unwrap();
        assert_eq!(d.picture_id, Some(PictureId::wide(0x18c0)));
        assert_eq!(d.header_len, 4);
    }

    #[test]
    fn all_extensions() {
        // I L T K, 15 bit picture id, tl0picidx 5, tid 2 y 1 keyidx 3
        let d = Vp8PayloadDescriptor::parse(&[0x80, 0xf0, 0x81, 0x00, 0x05, 0xa3, 0x00]).unwrap();
        assert!(!d.is_frame_start());
        assert_eq!(d.picture_id, Some(PictureId::wide(0x100)));
        assert_eq!(d.tl0_pic_idx, Some(5));
        assert_eq!(d.tid_y_keyidx, Some(0xa3));
        assert!(d.temporally_scaled);
        assert_eq!(d.header_len, 6);
    }

    #[test]
    fn partition_not_zero_is_not_start() {
        let d = Vp8PayloadDescriptor::parse(&[0x11, 0x00]).unwrap();
        assert!(d.start_of_partition);
        assert!(!d.is_frame_start());
    }

    #[test]
    fn too_short() {
        assert!(Vp8PayloadDescriptor::parse(&[]).is_err());
        assert!(Vp8PayloadDescriptor::parse(&[0x10]).is_err());
        // Picture id announced, but missing.
        assert!(Vp8PayloadDescriptor::parse(&[0x90, 0x80]).is_err());
        // 15 bit picture id cut in half.
        assert!(Vp8PayloadDescriptor::parse(&[0x90, 0x80, 0x98]).is_err());
        // Descriptor without any payload after it.
        assert_eq!(
            Vp8PayloadDescriptor::parse(&[0x90, 0x80, 0x18]),
            Err(PacketError::ShortPacket { needed: 3, len: 3 })
        );
    }

    #[test]
    fn keyframe_header() {
        let frame = [
            0xf0, 0x07, 0x00, 0x9d, 0x01, 0x2a, 0xb0, 0x00, 0x90, 0x00, 0x06,
        ];
        let h = Vp8FrameHeader::parse(&frame).unwrap();
        assert!(h.keyframe);
        assert_eq!(h.profile, 0);
        assert_eq!(h.width, 176);
        assert_eq!(h.height, 144);
    }

    #[test]
    fn inter_frame_header() {
        let frame = [
            0x31, 0x02, 0x00, 0x19, 0x11, 0xbc, 0x00, 0x18, 0x00, 0x18,
        ];
        let h = Vp8FrameHeader::parse(&frame).unwrap();
        assert!(!h.keyframe);
        assert_eq!(h.width, 0);
        assert_eq!(Vp8FrameHeader::parse(&frame[..9]), Err(PacketError::ShortFrame(9)));
    }
}
