use std::fmt;

/// VP8 picture id, 7 or 15 bits wide.
///
/// The width is decided by the sender per packet (the M bit), and an encoder
/// may switch from 7 to 15 bits when the id grows past 127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PictureId {
    value: u16,
    wide: bool,
}

impl PictureId {
    /// 7 bit picture id.
    pub fn narrow(value: u8) -> Self {
        PictureId {
            value: (value & 0x7f) as u16,
            wide: false,
        }
    }

    /// 15 bit picture id.
    pub fn wide(value: u16) -> Self {
        PictureId {
            value: value & 0x7fff,
            wide: true,
        }
    }

    /// Numeric value of the id.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Whether the id was sent using 15 bits.
    pub fn is_wide(&self) -> bool {
        self.wide
    }

    /// Circular distance from this id to `next`.
    ///
    /// The distance is calculated in the bit width of `next`, with a window of
    /// half that space in either direction.
    pub fn distance_to(&self, next: PictureId) -> i16 {
        let shift = 16 - if next.wide { 15 } else { 7 };
        let a = self.value << shift;
        let b = next.value << shift;
        (b.wrapping_sub(a) as i16) >> shift
    }

    /// Tells if `next` is the id directly following this.
    pub fn is_followed_by(&self, next: PictureId) -> bool {
        self.distance_to(next) == 1
    }
}

impl fmt::Display for PictureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wide {
            write!(f, "{:#06x}", self.value)
        } else {
            write!(f, "{:#04x}", self.value)
        }
    }
}
