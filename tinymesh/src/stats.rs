use anyhow::bail;
use bytes::{Buf, BufMut};

/// Counters of a node's traffic. All counters wrap.
///
/// The statistics travel as the payload of automatic ACK responses, so their wire form is fixed
///  (little-endian, as the firmware on the nodes lays them out):
///
/// ```ascii
/// 0:  pkts_sent            (u16)
/// 2:  pkts_intercepted     (u16)
/// 4:  pkts_repeated        (u16)
/// 6:  pkts_retried         (u16)
/// 8:  pkts_retried_others  (u16)
/// 10: rte_entries          (u8)
/// 11: rte_overwritten      (u8)
/// ```
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct MeshStats {
    /// transmissions of frames we originated
    pub pkts_sent: u16,
    /// every frame received from the radio
    pub pkts_intercepted: u16,
    /// transmissions on behalf of other nodes
    pub pkts_repeated: u16,
    pub pkts_retried: u16,
    pub pkts_retried_others: u16,
    pub rte_entries: u8,
    /// routing entries evicted to make room for a new destination
    pub rte_overwritten: u8,
}

impl MeshStats {
    pub const SERIALIZED_LEN: usize = 12;

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.pkts_sent);
        buf.put_u16_le(self.pkts_intercepted);
        buf.put_u16_le(self.pkts_repeated);
        buf.put_u16_le(self.pkts_retried);
        buf.put_u16_le(self.pkts_retried_others);
        buf.put_u8(self.rte_entries);
        buf.put_u8(self.rte_overwritten);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<MeshStats> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("statistics need {} bytes, got {}", Self::SERIALIZED_LEN, buf.remaining());
        }

        Ok(MeshStats {
            pkts_sent: buf.get_u16_le(),
            pkts_intercepted: buf.get_u16_le(),
            pkts_repeated: buf.get_u16_le(),
            pkts_retried: buf.get_u16_le(),
            pkts_retried_others: buf.get_u16_le(),
            rte_entries: buf.get_u8(),
            rte_overwritten: buf.get_u8(),
        })
    }

    pub(crate) fn to_bytes(self) -> [u8; Self::SERIALIZED_LEN] {
        let mut result = [0u8; Self::SERIALIZED_LEN];
        self.ser(&mut &mut result[..]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let stats = MeshStats {
            pkts_sent: 0x0201,
            pkts_intercepted: 3,
            pkts_repeated: 4,
            pkts_retried: 5,
            pkts_retried_others: 0x0100,
            rte_entries: 7,
            rte_overwritten: 8,
        };

        assert_eq!(stats.to_bytes(), [1, 2, 3, 0, 4, 0, 5, 0, 0, 1, 7, 8]);
        assert_eq!(MeshStats::deser(&mut &stats.to_bytes()[..]).unwrap(), stats);
    }

    #[test]
    fn test_deser_short_buffer() {
        assert!(MeshStats::deser(&mut &[0u8; 11][..]).is_err());
    }
}
