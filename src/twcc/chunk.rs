use crate::rtp_::{PacketChunk, PacketStatus, MAX_RUN_LENGTH};

// Bit order of the byte swapped word the writer fills in:
//
// | 7 | 6 | 5 | 4 | 3 | 2 | 1 | 0 | 15 | 14 | 13 | 12 | 11 | 10 | 9 | 8 |
//   T   S  <---------------- symbol list ------------------------------>

/// First writable position. Two bits are used for chunk type and symbol size.
const START_POS: i32 = 13;

/// Writes packet statuses into status vector chunks, falling back on run
/// length chunks for long runs of equal status.
#[derive(Debug)]
pub struct ChunkBitWriter {
    chunks: Vec<PacketChunk>,
    /// Status vector being filled, in byte swapped order.
    word: u16,
    /// 1 or 2 bits per symbol.
    num_bits: u8,
    pos: i32,
}

impl ChunkBitWriter {
    /// Creates a writer using `num_bits` (1 or 2) sized symbols for status vectors.
    pub fn new(num_bits: u8) -> Self {
        assert!(num_bits == 1 || num_bits == 2, "symbol size is 1 or 2 bits");

        let mut w = ChunkBitWriter {
            chunks: Vec::new(),
            word: 0,
            num_bits,
            pos: START_POS,
        };
        w.reset();
        w
    }

    fn reset(&mut self) {
        // chunk type and symbol size end up in bit 15 and 14 once swapped back.
        let header: u16 = (1 << 15) | ((self.num_bits as u16 - 1) << 14);
        self.word = header.swap_bytes();
        self.pos = START_POS;
    }

    /// Whether no symbol has been written to the current status vector.
    pub fn is_empty(&self) -> bool {
        self.pos == START_POS
    }

    /// Number of symbols left in the current status vector.
    pub fn available_slots(&self) -> usize {
        (self.pos / self.num_bits as i32 + 1) as usize
    }

    /// Number of symbols in a full status vector. 14 or 7.
    pub fn total_slots(&self) -> usize {
        (START_POS / self.num_bits as i32 + 1) as usize
    }

    /// Appends one status symbol to the current status vector.
    ///
    /// The vector is flushed to a chunk once full.
    pub fn write(&mut self, status: PacketStatus) {
        debug_assert!(
            self.num_bits == 2 || (status as u8) < 2,
            "{:?} needs 2 bit symbols",
            status
        );
        let num_bits = self.num_bits as i32;

        let mut pos = self.pos + 8;
        if pos > 15 {
            pos -= 16;
        }
        pos /= num_bits;

        let mask = (1_u16 << num_bits) - 1;
        self.word |= (status as u16 & mask) << (pos * num_bits);

        trace!(
            "Write status: {:?} slot: {} pos: {} bits: {}",
            status,
            pos,
            self.pos,
            num_bits
        );

        self.pos -= num_bits;
        if self.pos < 0 {
            self.flush();
        }
    }

    /// Append a run of `len` equal statuses as run length chunks.
    ///
    /// Runs longer than 8191 are split over several chunks.
    pub fn write_run(&mut self, status: PacketStatus, len: usize) {
        let mut written = 0;
        while written < len {
            let n = (len - written).min(MAX_RUN_LENGTH as usize);
            trace!("Write run length {} of status {:?}", n, status);
            self.chunks.push(PacketChunk::Run(status, n as u16));
            written += n;
        }
    }

    /// Emits the current status vector as a chunk, if anything was written to it.
    pub fn flush(&mut self) {
        if self.pos < START_POS {
            self.chunks.push(PacketChunk::from(self.word.swap_bytes()));
            self.reset();
        }
    }

    /// Flushes and returns all written chunks.
    pub fn finish(mut self) -> Vec<PacketChunk> {
        self.flush();
        self.chunks
    }
}

/// Encode a sequence of statuses into chunks.
///
/// A run of equal statuses longer than a full status vector is written as run
/// length chunks. When such a run starts inside a partially filled vector, the
/// vector is completed first, unless the run is short enough to not gain anything
/// from a run length chunk.
///
/// Status vectors use `num_bits` sized symbols, raised to 2 when a status
/// doesn't fit in 1 bit.
pub fn write_chunks(statuses: &[PacketStatus], num_bits: u8) -> Vec<PacketChunk> {
    let needs_two = statuses.iter().any(|s| (*s as u8) > 1);
    let num_bits = if num_bits == 1 && needs_two {
        debug!("Twcc statuses need 2 bit symbols");
        2
    } else {
        num_bits
    };

    let mut writer = ChunkBitWriter::new(num_bits);
    let capacity = writer.total_slots();

    let mut i = 0;
    while i < statuses.len() {
        let status = statuses[i];
        let run = statuses[i..].iter().take_while(|s| **s == status).count();

        if writer.is_empty() {
            if run > capacity {
                writer.write_run(status, run);
                i += run;
                continue;
            }
        } else {
            let available = writer.available_slots();
            if run > available + capacity {
                // here it is better to finish up the current status vector and then
                // go for run length.
                for _ in 0..available {
                    writer.write(status);
                }
                writer.write_run(status, run - available);
                i += run;
                continue;
            }
        }

        for _ in 0..run {
            writer.write(status);
        }
        i += run;
    }

    writer.finish()
}

/// Decode `count` statuses from chunks. Stops early if the chunks run out.
pub fn read_chunks(chunks: &[PacketChunk], count: usize) -> Vec<PacketStatus> {
    chunks
        .iter()
        .flat_map(|c| (0..c.status_capacity()).map(move |i| c.status_at(i)))
        .take(count)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    use PacketStatus::*;

    #[test]
    fn single_bit_vector_layout() {
        let mut w = ChunkBitWriter::new(1);
        assert_eq!(w.available_slots(), 14);
        w.write(ReceivedSmallDelta);
        w.write(NotReceived);
        w.write(ReceivedSmallDelta);
        assert_eq!(w.available_slots(), 11);

        let chunks = w.finish();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].to_wire(), 0b1_0_10100000000000);
        assert_eq!(chunks[0], PacketChunk::VectorSingle(0b10100000000000));
    }

    #[test]
    fn double_bit_vector_layout() {
        let mut w = ChunkBitWriter::new(2);
        assert_eq!(w.total_slots(), 7);
        w.write(ReceivedLargeOrNegativeDelta);
        w.write(ReceivedSmallDelta);
        w.write(NotReceived);
        w.write(ReceivedSmallDelta);

        let chunks = w.finish();
        assert_eq!(chunks, vec![PacketChunk::VectorDouble(0b10_01_00_01_00_00_00)]);
    }

    #[test]
    fn full_vector_flushes_itself() {
        let mut w = ChunkBitWriter::new(2);
        for _ in 0..7 {
            w.write(ReceivedSmallDelta);
        }
        assert!(w.is_empty());
        w.write(ReceivedSmallDelta);
        assert!(!w.is_empty());

        let chunks = w.finish();
        assert_eq!(
            chunks,
            vec![
                PacketChunk::VectorDouble(0b01_01_01_01_01_01_01),
                PacketChunk::VectorDouble(0b01_00_00_00_00_00_00),
            ]
        );
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let w = ChunkBitWriter::new(1);
        assert!(w.finish().is_empty());
    }

    #[test]
    fn long_missing_run_then_received() {
        let mut statuses = vec![NotReceived; 20];
        statuses.extend([ReceivedSmallDelta; 5]);

        let chunks = write_chunks(&statuses, 1);
        assert_eq!(chunks[0], PacketChunk::Run(NotReceived, 20));
        assert!(matches!(chunks[1], PacketChunk::VectorSingle(_)));
        assert_eq!(chunks.len(), 2);

        assert_eq!(read_chunks(&chunks, statuses.len()), statuses);
    }

    #[test]
    fn run_inside_vector_completes_vector() {
        let mut statuses = vec![ReceivedSmallDelta; 3];
        statuses.extend([NotReceived; 40]);
        statuses.push(ReceivedSmallDelta);

        let chunks = write_chunks(&statuses, 1);
        assert_eq!(chunks.len(), 3);
        assert!(matches!(chunks[0], PacketChunk::VectorSingle(_)));
        assert_eq!(chunks[1], PacketChunk::Run(NotReceived, 29));

        assert_eq!(read_chunks(&chunks, statuses.len()), statuses);
    }

    #[test]
    fn run_length_split_at_max() {
        let statuses = vec![NotReceived; 10_000];
        let chunks = write_chunks(&statuses, 1);
        assert_eq!(
            chunks,
            vec![
                PacketChunk::Run(NotReceived, 8191),
                PacketChunk::Run(NotReceived, 1809)
            ]
        );
    }

    #[test]
    fn mixed_statuses_read_back() {
        let statuses = vec![
            ReceivedSmallDelta,
            ReceivedLargeOrNegativeDelta,
            NotReceived,
            NotReceived,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedSmallDelta,
            ReceivedLargeOrNegativeDelta,
        ];

        let chunks = write_chunks(&statuses, 2);
        assert_eq!(read_chunks(&chunks, statuses.len()), statuses);
    }

    #[test]
    fn large_delta_status_upgrades_symbol_size() {
        let statuses = [ReceivedSmallDelta, ReceivedLargeOrNegativeDelta, NotReceived];

        let chunks = write_chunks(&statuses, 1);
        assert!(matches!(chunks[0], PacketChunk::VectorDouble(_)));
        assert_eq!(read_chunks(&chunks, 3), statuses);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn single_bit_writer_rejects_large_delta() {
        let mut w = ChunkBitWriter::new(1);
        w.write(ReceivedLargeOrNegativeDelta);
    }
}
