use serde::{Deserialize, Serialize};

use crate::rtp_::Ssrc;

/// Max send records kept for correlating feedback.
///
/// Indexes into the history are derived from 16 bit sequence numbers, and must
/// stay unambiguous.
const MAX_SEND_HISTORY: usize = 32_767;

/// Config for a [`Vp8Depacketizer`][crate::Vp8Depacketizer].
///
/// ```
/// use rtp_resilience::Vp8Config;
///
/// let config = Vp8Config::new()
///     .set_wait_for_keyframe(true)
///     .set_hide_picture_id_gap(false);
///
/// assert!(config.wait_for_keyframe());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vp8Config {
    pub(crate) hide_picture_id_gap: bool,
    pub(crate) wait_for_keyframe: bool,
}

impl Vp8Config {
    /// Creates a new default config.
    pub fn new() -> Self {
        Vp8Config::default()
    }

    /// Whether gaps in picture id are kept from creating loss events.
    ///
    /// Defaults to false.
    pub fn hide_picture_id_gap(&self) -> bool {
        self.hide_picture_id_gap
    }

    /// Don't create loss events for gaps in the picture id.
    ///
    /// Loss events received from the transport are still passed on.
    pub fn set_hide_picture_id_gap(mut self, enabled: bool) -> Self {
        self.hide_picture_id_gap = enabled;
        self
    }

    /// Whether inter frames are dropped after a discontinuity until the next keyframe.
    ///
    /// Defaults to false.
    pub fn wait_for_keyframe(&self) -> bool {
        self.wait_for_keyframe
    }

    /// Drop inter frames following a discontinuity until a keyframe arrives.
    ///
    /// Frames are never output before the first keyframe regardless of this setting.
    pub fn set_wait_for_keyframe(mut self, enabled: bool) -> Self {
        self.wait_for_keyframe = enabled;
        self
    }
}

/// Config for a [`TwccManager`][crate::twcc::TwccManager].
///
/// ```
/// use rtp_resilience::TwccConfig;
///
/// let config = TwccConfig::new().set_mtu(1400);
///
/// // Defaults to 4096.
/// assert_eq!(config.send_history(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwccConfig {
    pub(crate) mtu: usize,
    pub(crate) sender_ssrc: Ssrc,
    pub(crate) send_history: usize,
}

impl TwccConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        TwccConfig::default()
    }

    /// MTU limiting the size of each feedback packet.
    ///
    /// Defaults to 1200.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Set the MTU. The size of each feedback packet stays within it.
    pub fn set_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sender SSRC written in feedback packets.
    ///
    /// Random unless set.
    pub fn sender_ssrc(&self) -> Ssrc {
        self.sender_ssrc
    }

    /// Set the sender SSRC of feedback packets.
    pub fn set_sender_ssrc(mut self, ssrc: Ssrc) -> Self {
        self.sender_ssrc = ssrc;
        self
    }

    /// Number of sent packets remembered for correlating with feedback.
    pub fn send_history(&self) -> usize {
        self.send_history
    }

    /// Set the number of sent packets remembered.
    ///
    /// Clamped to 1..=32767.
    pub fn set_send_history(mut self, size: usize) -> Self {
        self.send_history = size.clamp(1, MAX_SEND_HISTORY);
        self
    }
}

impl Default for TwccConfig {
    fn default() -> Self {
        Self {
            mtu: 1200,
            sender_ssrc: Ssrc::new(),
            send_history: 4096,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn send_history_is_clamped() {
        assert_eq!(TwccConfig::new().set_send_history(0).send_history(), 1);
        assert_eq!(
            TwccConfig::new().set_send_history(100_000).send_history(),
            MAX_SEND_HISTORY
        );
    }

    #[test]
    fn config_serde() {
        let config = TwccConfig::new().set_mtu(500).set_sender_ssrc(7.into());
        let json = serde_json::to_string(&config).unwrap();
        let back: TwccConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let vp8: Vp8Config = serde_json::from_str(r#"{"wait_for_keyframe":true}"#).unwrap();
        assert!(vp8.wait_for_keyframe());
        assert!(!vp8.hide_picture_id_gap());
    }
}
