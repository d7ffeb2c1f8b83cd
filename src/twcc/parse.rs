use std::time::Duration;

use crate::rtp_::{PacketChunk, PacketStatus, FCI_HEADER_LEN};
use crate::rtp_::{seq_diff, seq_is_newer, TwccSeq};

use super::send::TwccSendRegister;
use super::{TwccError, DELTA_UNIT_MICROS, REF_TIME_UNIT_MICROS};

/// Smallest FCI worth parsing: the fixed header plus one chunk.
const MIN_FCI_LEN: usize = FCI_HEADER_LEN + 2;

/// Decoded TWCC feedback, joined with the local send history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwccReport {
    /// First sequence number described by the feedback itself.
    pub base_seq: TwccSeq,
    /// Packet status count as declared in the feedback.
    pub packet_count: u16,
    /// Remote reference time, already expanded from 64ms units.
    pub reference_time: Duration,
    /// Feedback packet counter of the remote side.
    pub feedback_count: u8,
    /// One entry per sequence number, in sequence order.
    ///
    /// Starts with entries for sequence numbers skipped since the previous
    /// feedback, all [`PacketStatus::NotReceived`].
    pub packets: Vec<TwccPacketInfo>,
}

/// Status of one sent packet as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwccPacketInfo {
    /// Transport-wide sequence number of the packet.
    pub seq: TwccSeq,
    /// Reported status. Gaps between feedbacks are [`PacketStatus::NotReceived`].
    pub status: PacketStatus,
    /// Remote arrival time, for received packets.
    pub remote_recv_time: Option<Duration>,
    /// When we sent the packet, if found in the send history.
    pub local_send_time: Option<Duration>,
    /// Socket level send time, if found in the send history and attached.
    pub socket_send_time: Option<Duration>,
    /// Payload size, if found in the send history.
    pub size: Option<usize>,
}

/// Parses received TWCC feedback, keeping a cursor of the next expected
/// sequence number across calls.
#[derive(Debug, Default)]
pub struct TwccParser {
    expected_seq: Option<u16>,
    last_feedback_count: Option<u8>,
}

impl TwccParser {
    /// Creates a parser with no feedback seen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the FCI of a TWCC feedback and correlate it with `send`.
    ///
    /// Only a missing fixed header is an error. A buffer cut short in the chunk
    /// or delta sections gives a report that ends where the data ran out.
    pub fn parse_fci(
        &mut self,
        fci: &[u8],
        send: &mut TwccSendRegister,
    ) -> Result<TwccReport, TwccError> {
        if fci.len() < MIN_FCI_LEN {
            return Err(TwccError::ShortFci(fci.len()));
        }

        let base_seq = u16::from_be_bytes([fci[0], fci[1]]);
        let packet_count = u16::from_be_bytes([fci[2], fci[3]]);
        let ref_units = u32::from_be_bytes([0, fci[4], fci[5], fci[6]]);
        let feedback_count = fci[7];

        debug!(
            "Parse twcc feedback #{} base_seq: {} count: {} ref_time: {}",
            feedback_count, base_seq, packet_count, ref_units
        );

        if let Some(last) = self.last_feedback_count {
            let expected = last.wrapping_add(1);
            if feedback_count != expected {
                debug!(
                    "Twcc feedback count gap, expected {} got {}",
                    expected, feedback_count
                );
            }
        }
        self.last_feedback_count = Some(feedback_count);

        let mut entries: Vec<(u16, PacketStatus)> = Vec::with_capacity(packet_count as usize);

        // Whole feedback windows might be lost, those are reported as not received.
        if let Some(expected) = self.expected_seq {
            let gap = seq_diff(expected, base_seq);
            if gap > 0 {
                debug!("Twcc feedback skipped {} seq from {}", gap, expected);
                entries.extend(
                    (0..gap as u16).map(|i| (expected.wrapping_add(i), PacketStatus::NotReceived)),
                );
            }
        }

        let mut parsed = 0;
        let mut offset = FCI_HEADER_LEN;

        while parsed < packet_count as usize && offset + 1 < fci.len() {
            let chunk = PacketChunk::from(u16::from_be_bytes([fci[offset], fci[offset + 1]]));
            let n = chunk.status_capacity().min(packet_count as usize - parsed);

            for i in 0..n {
                let seq = base_seq.wrapping_add((parsed + i) as u16);
                entries.push((seq, chunk.status_at(i)));
            }

            parsed += n;
            offset += 2;
        }

        if parsed < packet_count as usize {
            debug!(
                "Twcc chunks ended after {} of {} statuses",
                parsed, packet_count
            );
        }

        let mut reference = ref_units as i64 * REF_TIME_UNIT_MICROS;
        let mut packets = Vec::with_capacity(entries.len());

        for (seq, status) in entries {
            let units = match status {
                PacketStatus::ReceivedSmallDelta => {
                    if offset >= fci.len() {
                        debug!("Twcc deltas truncated at seq: {}", seq);
                        break;
                    }
                    let v = fci[offset] as i64;
                    offset += 1;
                    Some(v)
                }
                PacketStatus::ReceivedLargeOrNegativeDelta => {
                    if offset + 2 > fci.len() {
                        debug!("Twcc deltas truncated at seq: {}", seq);
                        break;
                    }
                    let v = i16::from_be_bytes([fci[offset], fci[offset + 1]]) as i64;
                    offset += 2;
                    Some(v)
                }
                // Not received and the reserved symbol carry no delta.
                _ => None,
            };

            let remote_recv_time = units.and_then(|u| {
                reference += u * DELTA_UNIT_MICROS;
                if reference < 0 {
                    warn!("Twcc remote time before zero for seq: {}", seq);
                    None
                } else {
                    Some(Duration::from_micros(reference as u64))
                }
            });

            trace!(
                "Parsed twcc seq: {} status: {:?} remote: {:?}",
                seq,
                status,
                remote_recv_time
            );

            let record = send.apply_status(seq, status, remote_recv_time);

            packets.push(TwccPacketInfo {
                seq: seq.into(),
                status,
                remote_recv_time,
                local_send_time: record.map(|r| r.local_send_time()),
                socket_send_time: record.and_then(|r| r.socket_send_time()),
                size: record.map(|r| r.size()),
            });
        }

        let end = base_seq.wrapping_add(packet_count);
        let advance = self
            .expected_seq
            .map(|e| seq_is_newer(e, end))
            .unwrap_or(true);
        if advance {
            self.expected_seq = Some(end);
        }

        Ok(TwccReport {
            base_seq: base_seq.into(),
            packet_count,
            reference_time: Duration::from_micros(ref_units as u64 * REF_TIME_UNIT_MICROS as u64),
            feedback_count,
            packets,
        })
    }

    /// Forget the feedback seen so far.
    pub fn reset(&mut self) {
        self.expected_seq = None;
        self.last_feedback_count = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use PacketStatus::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    // base_seq 0, count 3, ref_time 1 (64ms), fb count 0,
    // vector 1 1 1, deltas 4 (1ms), 4, 4.
    const FCI: &[u8] = &[
        0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x01, 0x00, //
        0b1_0_111000, 0x00, 0x04, 0x04, 0x04,
    ];

    #[test]
    fn parse_small_deltas() {
        let mut send = TwccSendRegister::new(100);
        let mut parser = TwccParser::new();

        let report = parser.parse_fci(FCI, &mut send).unwrap();
        assert_eq!(*report.base_seq, 0);
        assert_eq!(report.packet_count, 3);
        assert_eq!(report.reference_time, ms(64));
        assert_eq!(report.packets.len(), 3);
        assert_eq!(report.packets[0].remote_recv_time, Some(ms(65)));
        assert_eq!(report.packets[2].remote_recv_time, Some(ms(67)));
        assert!(report.packets.iter().all(|p| p.local_send_time.is_none()));
    }

    #[test]
    fn too_short() {
        let mut send = TwccSendRegister::new(100);
        let mut parser = TwccParser::new();
        let res = parser.parse_fci(&FCI[..9], &mut send);
        assert!(matches!(res, Err(TwccError::ShortFci(9))));
    }

    #[test]
    fn truncated_deltas_truncate_report() {
        let mut send = TwccSendRegister::new(100);
        let mut parser = TwccParser::new();

        let report = parser.parse_fci(&FCI[..12], &mut send).unwrap();
        assert_eq!(report.packets.len(), 2);
    }

    #[test]
    fn correlates_with_send_history() {
        let mut send = TwccSendRegister::new(100);
        for i in 0..3 {
            send.send_packet(ms(10 + i), 1000 + i as usize);
        }
        send.attach_socket_timestamp(1, ms(12));

        let mut parser = TwccParser::new();
        let report = parser.parse_fci(FCI, &mut send).unwrap();

        let p = &report.packets[1];
        assert_eq!(p.local_send_time, Some(ms(11)));
        assert_eq!(p.socket_send_time, Some(ms(12)));
        assert_eq!(p.size, Some(1001));
        assert_eq!(send.get(1).unwrap().remote_recv_time(), Some(ms(66)));
    }

    #[test]
    fn gap_since_previous_feedback_is_not_received() {
        let mut send = TwccSendRegister::new(100);
        for i in 0..8 {
            send.send_packet(ms(i), 100);
        }
        let mut parser = TwccParser::new();
        parser.parse_fci(FCI, &mut send).unwrap();

        // Next feedback starts at 5, skipping 3 and 4.
        let mut next = FCI.to_vec();
        next[1] = 5;
        next[7] = 1;
        let report = parser.parse_fci(&next, &mut send).unwrap();

        let seqs: Vec<_> = report.packets.iter().map(|p| (*p.seq, p.status)).collect();
        assert_eq!(
            seqs,
            vec![
                (3, NotReceived),
                (4, NotReceived),
                (5, ReceivedSmallDelta),
                (6, ReceivedSmallDelta),
                (7, ReceivedSmallDelta),
            ]
        );
        assert!(send.get(3).unwrap().is_lost());
        assert!(!send.get(5).unwrap().is_lost());
        // Deltas start from the reference time, not the skipped entries.
        assert_eq!(report.packets[2].remote_recv_time, Some(ms(65)));
    }

    #[test]
    fn negative_delta() {
        let fci = [
            0x00, 0x0a, 0x00, 0x02, 0x00, 0x00, 0x02, 0x05, //
            0b1_1_01_10_00, 0x00, // two bit vector: small, large
            40,   // +10ms
            0xff, 0xd8, // -40 units, -10ms
        ];
        let mut send = TwccSendRegister::new(100);
        let mut parser = TwccParser::new();
        let report = parser.parse_fci(&fci, &mut send).unwrap();

        assert_eq!(report.packets[0].seq, 10.into());
        assert_eq!(report.packets[0].remote_recv_time, Some(ms(138)));
        assert_eq!(report.packets[1].status, ReceivedLargeOrNegativeDelta);
        assert_eq!(report.packets[1].remote_recv_time, Some(ms(128)));
    }

    #[test]
    fn not_received_has_no_delta() {
        let fci = [
            0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, //
            0b1_0_101000, 0x00, // received, not received, received
            8, 8,
        ];
        let mut send = TwccSendRegister::new(100);
        let mut parser = TwccParser::new();
        let report = parser.parse_fci(&fci, &mut send).unwrap();

        assert_eq!(report.packets[1].status, NotReceived);
        assert_eq!(report.packets[1].remote_recv_time, None);
        assert_eq!(report.packets[2].remote_recv_time, Some(ms(4)));
    }
}
