use std::collections::VecDeque;
use std::time::Duration;

use crate::rtp_::{Delta, PacketStatus, Twcc};
use crate::rtp_::{seq_diff, seq_is_newer, Ssrc};

use super::chunk::write_chunks;
use super::{max_packets_for_mtu, TwccError};
use super::{DELTA_UNIT_MICROS, MANY_LOST_MIN_SPAN, REF_TIME_UNIT_MICROS};

/// Arrivals this far behind the last reported sequence number are not
/// considered late, but a sequence restart.
const LATE_WINDOW: i16 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Receipt {
    seq: u16,
    arrival: Duration,
}

/// Register of received transport-wide sequence numbers.
///
/// Arrivals are batched until a feedback is triggered, at which point the batch is
/// encoded into a [`Twcc`] packet and queued.
#[derive(Debug)]
pub struct TwccRecvRegister {
    /// Max number of statuses (including not received) in one feedback.
    max_packets: usize,

    sender_ssrc: Ssrc,

    /// First media SSRC seen. Used as media SSRC of the feedback.
    media_ssrc: Option<Ssrc>,

    /// Unsorted arrivals not yet reported.
    batch: Vec<Receipt>,

    /// Sequence number of the previous arrival. For duplicate detection.
    last_seq: Option<u16>,

    /// Highest sequence number included in an emitted feedback.
    reported_until: Option<u16>,

    /// Counter that increases by one for each feedback generated.
    feedback_count: u8,

    /// Built feedback waiting to be polled.
    ready: VecDeque<Twcc>,
}

impl TwccRecvRegister {
    /// Creates a register producing feedback that fits in `mtu`.
    pub fn new(mtu: usize, sender_ssrc: Ssrc) -> Result<Self, TwccError> {
        let max_packets = max_packets_for_mtu(mtu)?;

        Ok(TwccRecvRegister {
            max_packets,
            sender_ssrc,
            media_ssrc: None,
            batch: Vec::new(),
            last_seq: None,
            reported_until: None,
            feedback_count: 0,
            ready: VecDeque::new(),
        })
    }

    /// Max number of statuses in one feedback.
    pub fn max_packets(&self) -> usize {
        self.max_packets
    }

    /// Record the arrival of a packet carrying transport-wide sequence number `seq`.
    ///
    /// Might queue one or two feedback packets: one for the existing batch when `seq`
    /// does not fit alongside it, and one for the batch including `seq` when the
    /// packet has the marker bit, or when there are many losses.
    pub fn record_receipt(&mut self, seq: u16, arrival: Duration, ssrc: Ssrc, marker: bool) {
        // Duplicates would look like a gap of 65535.
        if self.last_seq == Some(seq) {
            warn!("Duplicate twcc seq ({}) received", seq);
            return;
        }

        if let Some(reported) = self.reported_until {
            let d = seq_diff(reported, seq);
            if d <= 0 && d > -LATE_WINDOW {
                debug!(
                    "Drop late twcc seq ({}), already reported up to {}",
                    seq, reported
                );
                return;
            }
        }

        if !self.batch.is_empty() && self.span_with(Some(seq)) > self.max_packets {
            debug!(
                "Twcc seq ({}) does not fit in feedback of max {} packets",
                seq, self.max_packets
            );
            self.build_feedback();
        }

        if self.media_ssrc.is_none() {
            self.media_ssrc = Some(ssrc);
        }

        self.batch.push(Receipt { seq, arrival });
        self.last_seq = Some(seq);

        trace!("Received twcc seq: {}, marker: {}", seq, marker);

        if marker {
            self.build_feedback();
            return;
        }

        let span = self.span_with(None);
        if span >= MANY_LOST_MIN_SPAN && span > self.batch.len() {
            debug!(
                "Twcc feedback for {} received out of {}",
                self.batch.len(),
                span
            );
            self.build_feedback();
        }
    }

    /// Number of sequence numbers covered by the batch, optionally extended by `extra`.
    fn span_with(&self, extra: Option<u16>) -> usize {
        let Some(anchor) = self.batch.first().map(|r| r.seq) else {
            return if extra.is_some() { 1 } else { 0 };
        };

        let offsets = self
            .batch
            .iter()
            .map(|r| r.seq)
            .chain(extra)
            .map(|s| seq_diff(anchor, s) as i32);

        let (lo, hi) = offsets.fold((0, 0), |(lo, hi), o| (lo.min(o), hi.max(o)));

        (hi - lo + 1) as usize
    }

    /// Encode the current batch, if any, into feedback packets.
    ///
    /// Usually one packet. An arrival gap too large for a receive delta ends the
    /// packet before that arrival and starts the next one from it.
    pub fn build_feedback(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let mut batch = std::mem::take(&mut self.batch);
        sort_receipts(&mut batch);

        let mut rest = &batch[..];

        while !rest.is_empty() {
            let (twcc, used) = encode_feedback(
                rest,
                self.sender_ssrc,
                self.media_ssrc.unwrap_or_else(|| 0.into()),
                self.feedback_count,
            );
            rest = &rest[used..];
            self.push_feedback(twcc);
        }

        batch.clear();
        self.batch = batch;
    }

    fn push_feedback(&mut self, twcc: Twcc) {
        self.feedback_count = self.feedback_count.wrapping_add(1);

        let last_seq = twcc
            .base_seq
            .wrapping_add(twcc.status_count.saturating_sub(1));
        let newer = self
            .reported_until
            .map(|r| seq_is_newer(r, last_seq))
            .unwrap_or(true);
        if newer {
            self.reported_until = Some(last_seq);
        }

        debug!(
            "Twcc feedback #{} base_seq: {} count: {}",
            twcc.feedback_count, twcc.base_seq, twcc.status_count
        );

        self.ready.push_back(twcc);
    }

    /// Next feedback, in the order built.
    pub fn poll_feedback(&mut self) -> Option<Twcc> {
        self.ready.pop_front()
    }

    /// Tells if there are arrivals not yet in any feedback.
    pub fn has_unreported(&self) -> bool {
        !self.batch.is_empty()
    }

    /// Forget arrivals and queued feedback. The feedback counter keeps going.
    pub fn reset(&mut self) {
        self.media_ssrc = None;
        self.batch.clear();
        self.last_seq = None;
        self.reported_until = None;
        self.ready.clear();
    }
}

/// Sort arrivals by sequence number and drop duplicates.
fn sort_receipts(batch: &mut Vec<Receipt>) {
    // Sort relative the first arrival. A batch never spans more than half the
    // sequence space, which makes this a total order.
    let anchor = batch[0].seq;
    batch.sort_by_key(|r| seq_diff(anchor, r.seq));
    batch.dedup_by_key(|r| r.seq);
}

/// Encode sorted arrivals into a feedback packet.
///
/// Returns the packet and the number of arrivals it covers. That is all of them,
/// unless the time from one arrival to the next doesn't fit a receive delta. The
/// first arrival always fits.
fn encode_feedback(
    batch: &[Receipt],
    sender_ssrc: Ssrc,
    media_ssrc: Ssrc,
    feedback_count: u8,
) -> (Twcc, usize) {
    let first = batch[0];

    // The value is to be interpreted in multiples of 64ms.
    let ref_units = first.arrival.as_micros() as u64 / REF_TIME_UNIT_MICROS as u64;

    // The first delta is relative the truncated reference time. Every following
    // delta is relative the previous one as rounded, to not accumulate drift.
    let mut reference = ref_units as i64 * REF_TIME_UNIT_MICROS;

    let mut statuses = Vec::new();
    let mut delta = Vec::with_capacity(batch.len());
    let mut prev_seq = None;

    for r in batch {
        let diff = r.arrival.as_micros() as i64 - reference;
        let units = diff / DELTA_UNIT_MICROS;

        let d = if (0..=255).contains(&units) {
            Delta::Small(units as u8)
        } else if let Ok(v) = i16::try_from(units) {
            Delta::Large(v)
        } else {
            debug!(
                "Twcc delta ({}) does not fit, new feedback from seq: {}",
                units, r.seq
            );
            break;
        };

        if let Some(prev) = prev_seq {
            let missing = r.seq.wrapping_sub(prev).wrapping_sub(1) as usize;
            statuses.extend(std::iter::repeat(PacketStatus::NotReceived).take(missing));
        }
        prev_seq = Some(r.seq);

        let status = match d {
            Delta::Small(_) => PacketStatus::ReceivedSmallDelta,
            Delta::Large(_) => PacketStatus::ReceivedLargeOrNegativeDelta,
        };

        reference += units * DELTA_UNIT_MICROS;
        statuses.push(status);
        delta.push(d);
    }

    let has_large = delta.iter().any(|d| matches!(d, Delta::Large(_)));
    let num_bits = if has_large { 2 } else { 1 };

    let chunks = write_chunks(&statuses, num_bits);
    let used = delta.len();

    let twcc = Twcc {
        sender_ssrc,
        ssrc: media_ssrc,
        base_seq: first.seq,
        status_count: statuses.len() as u16,
        reference_time: (ref_units & 0xff_ffff) as u32,
        feedback_count,
        chunks,
        delta,
    };

    (twcc, used)
}
