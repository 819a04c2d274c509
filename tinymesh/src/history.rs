use crate::frame::Frame;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct HistoryEntry {
    src: u8,
    seq: u8,
    retries: u8,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct HistoryCheck {
    /// the packet was seen before
    pub is_duplicate: bool,
    /// the packet was seen before, but with a different number of remaining retries, so its
    ///  origin has not heard the response yet
    pub is_retry: bool,
}

impl HistoryCheck {
    pub fn is_unique(&self) -> bool {
        !self.is_duplicate || self.is_retry
    }
}

/// Ring buffer of recently seen packets, identified by network source and sequence number
#[derive(Debug, Clone)]
pub struct PacketHistory<const N: usize> {
    entries: [Option<HistoryEntry>; N],
    write_pos: usize,
}

impl <const N: usize> Default for PacketHistory<N> {
    fn default() -> Self {
        PacketHistory {
            entries: [None; N],
            write_pos: 0,
        }
    }
}

impl <const N: usize> PacketHistory<N> {
    pub fn new() -> PacketHistory<N> {
        Self::default()
    }

    pub fn check_and_record(&mut self, frame: &Frame) -> HistoryCheck {
        let src = frame.nwk.src;
        let seq = frame.info.pkt_seq_num;
        let retries = frame.info.retries_remaining;

        if let Some(existing) = self.entries.iter_mut()
            .flatten()
            .find(|e| e.src == src && e.seq == seq)
        {
            let is_retry = existing.retries != retries;
            existing.retries = retries;
            return HistoryCheck { is_duplicate: true, is_retry };
        }

        if N > 0 {
            self.entries[self.write_pos] = Some(HistoryEntry { src, seq, retries });
            self.write_pos = (self.write_pos + 1) % N;
        }
        HistoryCheck::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AddrPair;

    fn frame(src: u8, seq: u8, retries: u8) -> Frame {
        let mut result = Frame::default();
        result.nwk = AddrPair { src, dst: 9 };
        result.info.pkt_seq_num = seq;
        result.info.retries_remaining = retries;
        result
    }

    #[test]
    fn test_duplicate_and_retry() {
        let mut history = PacketHistory::<4>::new();

        let first = history.check_and_record(&frame(1, 7, 2));
        assert_eq!(first, HistoryCheck { is_duplicate: false, is_retry: false });
        assert!(first.is_unique());

        let dup = history.check_and_record(&frame(1, 7, 2));
        assert_eq!(dup, HistoryCheck { is_duplicate: true, is_retry: false });
        assert!(!dup.is_unique());

        let retry = history.check_and_record(&frame(1, 7, 1));
        assert_eq!(retry, HistoryCheck { is_duplicate: true, is_retry: true });
        assert!(retry.is_unique());

        assert_eq!(history.check_and_record(&frame(1, 7, 1)).is_retry, false);
    }

    #[test]
    fn test_distinguishes_sources() {
        let mut history = PacketHistory::<4>::new();
        history.check_and_record(&frame(1, 7, 2));
        assert!(!history.check_and_record(&frame(2, 7, 2)).is_duplicate);
        assert!(!history.check_and_record(&frame(1, 8, 2)).is_duplicate);
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut history = PacketHistory::<2>::new();
        history.check_and_record(&frame(1, 1, 0));
        history.check_and_record(&frame(1, 2, 0));
        history.check_and_record(&frame(1, 3, 0));

        assert!(history.check_and_record(&frame(1, 3, 0)).is_duplicate);
        assert!(history.check_and_record(&frame(1, 2, 0)).is_duplicate);
        assert!(!history.check_and_record(&frame(1, 1, 0)).is_duplicate);
    }
}
