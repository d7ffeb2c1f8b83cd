use std::collections::vec_deque;
use std::collections::VecDeque;
use std::time::Duration;

use crate::rtp_::PacketStatus;
use crate::rtp_::TwccSeq;

/// Record for a send entry in twcc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwccSendRecord {
    /// Twcc sequence number for a packet we sent.
    seq: TwccSeq,

    /// The (local) time we sent the packet represented by seq.
    local_send_time: Duration,

    /// Size in bytes of the payload sent.
    size: usize,

    /// Time the socket reported the packet as sent.
    socket_send_time: Option<Duration>,

    /// The remote time the other side received the seq.
    remote_recv_time: Option<Duration>,

    /// Set when a feedback reported the packet as not received.
    lost: bool,
}

impl TwccSendRecord {
    /// The twcc sequence number of the packet we sent.
    pub fn seq(&self) -> TwccSeq {
        self.seq
    }

    /// The time we sent the packet.
    pub fn local_send_time(&self) -> Duration {
        self.local_send_time
    }

    /// Size in bytes of the payload sent.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Send time as reported by OS level socket timestamping, if attached.
    pub fn socket_send_time(&self) -> Option<Duration> {
        self.socket_send_time
    }

    /// The time indicated by the remote side for when they received the packet.
    pub fn remote_recv_time(&self) -> Option<Duration> {
        self.remote_recv_time
    }

    /// Whether the most informative feedback so far says the packet never arrived.
    pub fn is_lost(&self) -> bool {
        self.lost
    }
}

/// Append only history of sent packets, in send order.
///
/// Records are found by index `seq - first.seq`, which requires sequence numbers
/// to be registered without gaps.
#[derive(Debug)]
pub struct TwccSendRegister {
    /// How many send records to keep.
    keep: usize,

    /// Circular buffer of send records.
    queue: VecDeque<TwccSendRecord>,

    /// Next sequence number to hand out in `send_packet`.
    next_seq: TwccSeq,
}

impl<'a> IntoIterator for &'a TwccSendRegister {
    type Item = &'a TwccSendRecord;
    type IntoIter = vec_deque::Iter<'a, TwccSendRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.queue.iter()
    }
}

impl TwccSendRegister {
    /// Creates a register keeping at most `keep` records.
    pub fn new(keep: usize) -> Self {
        TwccSendRegister {
            keep,
            queue: VecDeque::new(),
            next_seq: 0.into(),
        }
    }

    /// Allocate the next transport-wide sequence number and record the send.
    pub fn send_packet(&mut self, now: Duration, size: usize) -> TwccSeq {
        let seq = self.next_seq;
        self.record_send(seq, now, size);
        seq
    }

    /// Record a sent packet with an externally assigned sequence number.
    pub fn record_send(&mut self, seq: TwccSeq, now: Duration, size: usize) {
        self.next_seq = seq.next();
        self.queue.push_back(TwccSendRecord {
            seq,
            local_send_time: now,
            size,
            socket_send_time: None,
            remote_recv_time: None,
            lost: false,
        });
        while self.queue.len() > self.keep {
            self.queue.pop_front();
        }
    }

    fn index_of(&self, seq: u16) -> Option<usize> {
        let first = self.queue.front()?;
        let index = seq.wrapping_sub(*first.seq) as usize;
        let record = self.queue.get(index)?;

        // Any mismatch means the history has gaps, and we can't trust the lookup.
        (*record.seq == seq).then_some(index)
    }

    /// The record of `seq`, if still kept.
    pub fn get(&self, seq: u16) -> Option<&TwccSendRecord> {
        self.index_of(seq).map(|i| &self.queue[i])
    }

    /// Attach a socket level send timestamp to an already recorded send.
    ///
    /// Returns false if there is no matching record.
    pub fn attach_socket_timestamp(&mut self, seq: u16, ts: Duration) -> bool {
        let Some(index) = self.index_of(seq) else {
            debug!("No send record for socket timestamp of twcc seq: {}", seq);
            return false;
        };
        self.queue[index].socket_send_time = Some(ts);
        true
    }

    /// Apply the status of one packet in a received feedback.
    pub(crate) fn apply_status(
        &mut self,
        seq: u16,
        status: PacketStatus,
        remote_recv_time: Option<Duration>,
    ) -> Option<&TwccSendRecord> {
        let index = self.index_of(seq)?;
        let record = &mut self.queue[index];

        if status.has_delta() {
            record.remote_recv_time = remote_recv_time.or(record.remote_recv_time);
            record.lost = false;
        } else if record.remote_recv_time.is_none() {
            record.lost = true;
        }

        Some(record)
    }

    /// Number of kept records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Tells if there are no records.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Forget all records.
    pub fn reset(&mut self) {
        self.queue.clear();
    }
}
