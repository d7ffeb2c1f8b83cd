use std::collections::VecDeque;
use std::time::Duration;

use crate::config::Vp8Config;
use crate::rtp_::RtpPacket;

use super::loss::HeldLoss;
use super::vp8::{Vp8FrameHeader, Vp8PayloadDescriptor};
use super::{LossEvent, PictureId};

/// Size and profile of a VP8 stream, as found in keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vp8Format {
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// VP8 version/profile.
    pub profile: u8,
}

/// A complete VP8 frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Vp8Frame {
    /// Frame data, payload descriptors removed.
    pub data: Vec<u8>,
    /// Whether this is a keyframe.
    pub keyframe: bool,
    /// Format of keyframes.
    pub format: Option<Vp8Format>,
    /// RTP time of the last packet of the frame.
    pub rtp_time: u32,
    /// Presentation time of the last packet of the frame.
    pub pts: Option<Duration>,
    /// Picture id of the last packet of the frame.
    pub picture_id: Option<PictureId>,
}

/// Output of the [`Vp8Depacketizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vp8Output {
    /// A reassembled frame.
    Frame(Vp8Frame),
    /// Keyframe with a different size or profile than before. Precedes the frame.
    FormatChanged(Vp8Format),
    /// Upstream should send a keyframe.
    KeyframeRequest,
    /// Data is missing downstream.
    PacketLost(LossEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No frame in progress.
    Idle,
    /// Collecting the packets of a frame.
    Accumulating,
}

/// Reassembles VP8 frames from RTP packets and reports missing frames.
///
/// Packets must be pushed in order (after any jitter buffer). Outputs are queued
/// and polled with [`Vp8Depacketizer::poll_output`].
///
/// Loss events from the transport (e.g. a jitter buffer giving up on a packet)
/// are passed in with [`Vp8Depacketizer::handle_packet_lost`]. When the last frame
/// was complete with a known picture id, such an event is held back: if the next
/// frame continues the picture id sequence, the lost packet carried nothing we
/// needed, and the event is dropped.
#[derive(Debug)]
pub struct Vp8Depacketizer {
    config: Vp8Config,
    state: State,
    frame: Vec<u8>,
    last_picture_id: Option<PictureId>,
    held: HeldLoss,
    /// Hold incoming loss events instead of passing them on.
    stop_lost_events: bool,
    /// The last output concerning loss was a loss event.
    last_pushed_was_lost_event: bool,
    /// A partial frame was thrown away without a loss event.
    frame_dropped: bool,
    waiting_for_keyframe: bool,
    last_format: Option<Vp8Format>,
    output: VecDeque<Vp8Output>,
}

impl Vp8Depacketizer {
    /// Creates a depacketizer that waits for a keyframe.
    pub fn new(config: Vp8Config) -> Self {
        Vp8Depacketizer {
            config,
            state: State::Idle,
            frame: Vec::new(),
            last_picture_id: None,
            held: HeldLoss::Empty,
            stop_lost_events: false,
            last_pushed_was_lost_event: false,
            frame_dropped: false,
            waiting_for_keyframe: true,
            last_format: None,
            output: VecDeque::new(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Vp8Config {
        &self.config
    }

    /// Push the next RTP packet of the stream.
    pub fn push(&mut self, packet: &RtpPacket) {
        if packet.discont {
            self.handle_discont();
        }

        let desc = match Vp8PayloadDescriptor::parse(packet.payload) {
            Ok(v) => v,
            Err(e) => {
                debug!("Invalid VP8 packet ({}), seq: {}", e, packet.seq_no);
                self.drop_frame();
                return;
            }
        };

        trace!(
            "VP8 packet seq: {} header_len: {} picture_id: {:?}",
            packet.seq_no,
            desc.header_len,
            desc.picture_id
        );

        if desc.is_frame_start() {
            self.start_frame(&desc, packet);
        } else if self.state == State::Idle {
            debug!(
                "Missing first packets of frame, ignore seq: {}",
                packet.seq_no
            );
            if self.stop_lost_events {
                self.forward_held();
                self.stop_lost_events = false;
            }
            if self.frame_dropped {
                self.signal_loss(packet.pts, "dropped frame");
            }
            return;
        }

        self.frame.extend_from_slice(&packet.payload[desc.header_len..]);
        self.last_picture_id = desc.picture_id;

        if packet.marker {
            self.finish_frame(&desc, packet);
        }
    }

    /// Pass on a loss event from the transport.
    ///
    /// The event is held back while all frames so far are known complete.
    pub fn handle_packet_lost(&mut self, event: LossEvent) {
        if self.stop_lost_events {
            debug!("Hold loss event: {:?}", event);
            self.held.hold(event);
            return;
        }

        self.push_lost(event);
    }

    /// Poll for the next output.
    pub fn poll_output(&mut self) -> Option<Vp8Output> {
        self.output.pop_front()
    }

    /// Forget the frame in progress and the picture id history.
    ///
    /// For when the stream is flushed. Any held loss event is dropped. Keyframe
    /// status is kept, and the next keyframe signals its format again.
    pub fn flush(&mut self) {
        debug!("Flush VP8 depacketizer");
        self.state = State::Idle;
        self.frame.clear();
        self.last_picture_id = None;
        self.held = HeldLoss::Empty;
        self.stop_lost_events = false;
        self.last_pushed_was_lost_event = false;
        self.frame_dropped = false;
        self.last_format = None;
    }

    /// Return to the initial state. Queued output is kept.
    ///
    /// Inter frames are again dropped until the first keyframe.
    pub fn reset(&mut self) {
        self.flush();
        self.waiting_for_keyframe = true;
    }

    fn handle_discont(&mut self) {
        debug!("Discontinuity, flush frame");

        if self.state == State::Accumulating {
            self.frame_dropped = true;
        }
        self.state = State::Idle;
        self.frame.clear();

        if self.config.wait_for_keyframe {
            self.waiting_for_keyframe = true;
        }
    }

    /// Throw away the frame in progress, treating it as lost.
    fn drop_frame(&mut self) {
        if self.state == State::Accumulating {
            self.frame_dropped = true;
        }
        self.state = State::Idle;
        self.frame.clear();
    }

    fn start_frame(&mut self, desc: &Vp8PayloadDescriptor, packet: &RtpPacket) {
        let mut signalled = false;

        if self.state == State::Accumulating {
            debug!("Incomplete frame, new frame start seq: {}", packet.seq_no);
            self.frame.clear();
            signalled |= self.signal_loss(packet.pts, "incomplete frame");
        }

        if self.frame_dropped {
            signalled |= self.signal_loss(packet.pts, "dropped frame");
        }

        if !signalled {
            self.check_picture_id(desc.picture_id, packet.pts);
        }

        self.state = State::Accumulating;
        self.stop_lost_events = false;
    }

    fn finish_frame(&mut self, desc: &Vp8PayloadDescriptor, packet: &RtpPacket) {
        self.state = State::Idle;
        let data = std::mem::take(&mut self.frame);

        let header = match Vp8FrameHeader::parse(&data) {
            Ok(v) => v,
            Err(e) => {
                debug!("Invalid VP8 frame ({}), seq: {}", e, packet.seq_no);
                self.frame_dropped = true;
                return;
            }
        };

        let format = if header.keyframe {
            let format = Vp8Format {
                width: header.width,
                height: header.height,
                profile: header.profile,
            };
            debug!("Keyframe {:?}", format);

            if self.last_format != Some(format) {
                self.last_format = Some(format);
                self.output.push_back(Vp8Output::FormatChanged(format));
            }
            self.waiting_for_keyframe = false;

            Some(format)
        } else {
            None
        };

        if desc.picture_id.is_some() {
            self.stop_lost_events = true;
        }

        if !header.keyframe && self.waiting_for_keyframe {
            info!("Drop inter frame while waiting for keyframe");
            self.output.push_back(Vp8Output::KeyframeRequest);
            return;
        }

        self.last_pushed_was_lost_event = false;
        self.output.push_back(Vp8Output::Frame(Vp8Frame {
            data,
            keyframe: header.keyframe,
            format,
            rtp_time: packet.rtp_time,
            pts: packet.pts,
            picture_id: desc.picture_id,
        }));
    }

    /// Check that `next` continues the picture id sequence.
    ///
    /// A held loss event is passed on if not, or dropped if it does.
    fn check_picture_id(&mut self, next: Option<PictureId>, pts: Option<Duration>) {
        let Some(last) = self.last_picture_id else {
            return;
        };

        let (reason, create) = match next {
            None => ("picture id does not exist", false),
            Some(n) if last.is_wide() && !n.is_wide() => ("picture id has less bits", false),
            Some(n) if !last.is_followed_by(n) => ("picture id gap", true),
            Some(_) => {
                if let Some(e) = self.held.take() {
                    debug!("Drop held loss event, picture id is continuous: {:?}", e);
                }
                return;
            }
        };

        debug!("Picture id {} -> {:?}: {}", last, next, reason);

        if self.forward_held() {
            return;
        }

        if create && !self.config.hide_picture_id_gap {
            self.signal_loss(pts, reason);
        }
    }

    /// Signal a lost frame, preferring a held transport event over creating one.
    ///
    /// Returns true if the loss is signalled, now or by an earlier event.
    fn signal_loss(&mut self, pts: Option<Duration>, reason: &str) -> bool {
        self.frame_dropped = false;

        if self.forward_held() {
            return true;
        }

        if self.last_pushed_was_lost_event {
            debug!("Loss already signalled ({})", reason);
            return true;
        }

        let Some(pts) = pts else {
            warn!("Can't create loss event without timestamp ({})", reason);
            return false;
        };

        debug!("Create loss event ({}) at {:?}", reason, pts);
        self.push_lost(LossEvent::missing_frame(pts));
        true
    }

    fn forward_held(&mut self) -> bool {
        let Some(event) = self.held.take() else {
            return false;
        };
        debug!("Forward held loss event: {:?}", event);
        self.push_lost(event);
        true
    }

    fn push_lost(&mut self, event: LossEvent) {
        self.last_pushed_was_lost_event = true;
        self.output.push_back(Vp8Output::PacketLost(event));
    }
}

impl std::fmt::Debug for Vp8Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vp8Frame")
            .field("data", &self.data.len())
            .field("keyframe", &self.keyframe)
            .field("format", &self.format)
            .field("rtp_time", &self.rtp_time)
            .field("pts", &self.pts)
            .field("picture_id", &self.picture_id)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY: &[u8] = &[
        0xf0, 0x07, 0x00, 0x9d, 0x01, 0x2a, 0xb0, 0x00, 0x90, 0x00, 0x06, 0x47,
    ];
    const INTER: &[u8] = &[
        0x31, 0x02, 0x00, 0x19, 0x11, 0xbc, 0x00, 0x18, 0x00, 0x18, 0x58,
    ];

    fn payload(picture_id: u8, vp8: &[u8]) -> Vec<u8> {
        let mut v = vec![0x90, 0x80, picture_id];
        v.extend_from_slice(vp8);
        v
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn push(d: &mut Vp8Depacketizer, seq: u16, data: &[u8], marker: bool) {
        let p = RtpPacket::new(data)
            .with_seq_no(seq)
            .with_marker(marker)
            .with_pts(ms(seq as u64 * 10));
        d.push(&p);
    }

    fn drain(d: &mut Vp8Depacketizer) -> Vec<Vp8Output> {
        std::iter::from_fn(|| d.poll_output()).collect()
    }

    fn lost(out: &[Vp8Output]) -> usize {
        out.iter()
            .filter(|o| matches!(o, Vp8Output::PacketLost(_)))
            .count()
    }

    #[test]
    fn keyframe_then_inter() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(24, KEY), true);

        let out = drain(&mut d);
        let format = Vp8Format {
            width: 176,
            height: 144,
            profile: 0,
        };
        assert_eq!(out[0], Vp8Output::FormatChanged(format));
        let Vp8Output::Frame(f) = &out[1] else {
            panic!("Expected frame");
        };
        assert!(f.keyframe);
        assert_eq!(f.data, KEY);
        assert_eq!(f.format, Some(format));

        push(&mut d, 1, &payload(25, INTER), true);
        let out = drain(&mut d);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Vp8Output::Frame(f) if !f.keyframe));
    }

    #[test]
    fn frame_over_several_packets() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(1, &KEY[..4]), false);
        // continuation: no S bit
        let mut cont = vec![0x80, 0x80, 1];
        cont.extend_from_slice(&KEY[4..]);
        push(&mut d, 1, &cont, true);

        let out = drain(&mut d);
        assert!(matches!(&out[1], Vp8Output::Frame(f) if f.data == KEY));
    }

    #[test]
    fn inter_before_keyframe_requests_keyframe() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(5, INTER), true);
        assert_eq!(drain(&mut d), vec![Vp8Output::KeyframeRequest]);
    }

    #[test]
    fn picture_id_gap() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 100, &payload(24, KEY), true);
        drain(&mut d);

        push(&mut d, 102, &payload(26, INTER), true);
        let out = drain(&mut d);
        assert_eq!(
            out[0],
            Vp8Output::PacketLost(LossEvent {
                timestamp: ms(1020),
                duration: Duration::ZERO,
                no_packet_loss: true,
            })
        );
        assert_eq!(lost(&out), 1);
    }

    #[test]
    fn hidden_picture_id_gap() {
        let config = Vp8Config::new().set_hide_picture_id_gap(true);
        let mut d = Vp8Depacketizer::new(config);
        push(&mut d, 100, &payload(24, KEY), true);
        push(&mut d, 102, &payload(26, INTER), true);
        assert_eq!(lost(&drain(&mut d)), 0);
    }

    #[test]
    fn held_loss_dropped_when_continuous() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(24, KEY), true);
        d.handle_packet_lost(LossEvent::packet_loss(ms(10), ms(10)));
        push(&mut d, 2, &payload(25, INTER), true);

        assert_eq!(lost(&drain(&mut d)), 0);
    }

    #[test]
    fn held_loss_forwarded_on_gap() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(24, KEY), true);
        let event = LossEvent::packet_loss(ms(10), ms(10));
        d.handle_packet_lost(event);
        push(&mut d, 2, &payload(26, INTER), true);

        let out = drain(&mut d);
        assert_eq!(lost(&out), 1);
        assert!(out.contains(&Vp8Output::PacketLost(event)));
    }

    #[test]
    fn incomplete_frame() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(24, KEY), true);
        push(&mut d, 1, &payload(25, &INTER[..4]), false);
        // marker packet lost, next frame starts
        push(&mut d, 3, &payload(26, INTER), true);

        let out = drain(&mut d);
        assert_eq!(lost(&out), 1);
        assert!(matches!(out.last(), Some(Vp8Output::Frame(f)) if f.data == INTER));
    }

    #[test]
    fn discont_drops_frame_and_signals_once() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(24, KEY), true);
        push(&mut d, 1, &payload(25, &INTER[..4]), false);

        // Tail of a frame, after a discontinuity.
        let mut data = vec![0x80, 0x80, 25];
        data.extend_from_slice(&INTER[4..]);
        let p = RtpPacket::new(&data)
            .with_seq_no(5)
            .with_discont(true)
            .with_pts(ms(50));
        d.push(&p);

        push(&mut d, 6, &payload(27, INTER), true);

        let out = drain(&mut d);
        // The frame lost in the discontinuity and the picture id gap are one loss.
        assert_eq!(lost(&out), 1);
        assert_eq!(
            out[2],
            Vp8Output::PacketLost(LossEvent::missing_frame(ms(50)))
        );
    }

    #[test]
    fn wait_for_keyframe_after_discont() {
        let config = Vp8Config::new().set_wait_for_keyframe(true);
        let mut d = Vp8Depacketizer::new(config);
        push(&mut d, 0, &payload(24, KEY), true);
        drain(&mut d);

        let data = payload(25, INTER);
        let p = RtpPacket::new(&data)
            .with_seq_no(1)
            .with_marker(true)
            .with_discont(true);
        d.push(&p);
        assert_eq!(drain(&mut d), vec![Vp8Output::KeyframeRequest]);

        push(&mut d, 2, &payload(26, KEY), true);
        let out = drain(&mut d);
        assert!(matches!(out.last(), Some(Vp8Output::Frame(f)) if f.keyframe));
    }

    #[test]
    fn format_change_only_when_different() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(1, KEY), true);
        push(&mut d, 1, &payload(2, KEY), true);
        let out = drain(&mut d);
        let changes = out
            .iter()
            .filter(|o| matches!(o, Vp8Output::FormatChanged(_)))
            .count();
        assert_eq!(changes, 1);

        d.flush();
        push(&mut d, 2, &payload(3, KEY), true);
        let out = drain(&mut d);
        assert!(matches!(out[0], Vp8Output::FormatChanged(_)));
    }

    #[test]
    fn short_frame_is_dropped() {
        let mut d = Vp8Depacketizer::new(Vp8Config::new());
        push(&mut d, 0, &payload(1, &KEY[..5]), true);
        assert!(drain(&mut d).is_empty());
    }
}
