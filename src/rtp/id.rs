#![allow(missing_docs)]

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! num_id {
    ($id:ident, $t:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $id($t);

        impl Deref for $id {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$t> for $id {
            fn from(v: $t) -> Self {
                $id(v)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

num_id!(Ssrc, u32);
num_id!(TwccSeq, u16);

impl Ssrc {
    /// Random SSRC.
    pub fn new() -> Self {
        Ssrc(fastrand::u32(..))
    }

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl Default for Ssrc {
    fn default() -> Self {
        Ssrc::new()
    }
}

impl TwccSeq {
    /// The sequence number following this one, wrapping at 65535.
    pub fn next(&self) -> Self {
        TwccSeq(self.0.wrapping_add(1))
    }
}
