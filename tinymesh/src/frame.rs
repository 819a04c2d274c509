use std::fmt::{Debug, Display, Formatter};

use anyhow::bail;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::payload::PayloadReader;

/// Size of a frame on the air, fixed by the radio's payload size
pub const FRAME_SIZE: usize = 32;
/// network addresses (2) + MAC addresses (2) + info (4)
pub const HEADER_SIZE: usize = 8;
pub const DATA_SIZE: usize = FRAME_SIZE - HEADER_SIZE;

pub const MESH_VERSION: u8 = 3;

pub const BROADCAST_ADDR: u8 = 0xFF;
pub const ZERO_ADDR: u8 = 0x00;

/// limited by the 4-bit hop count fields
pub const HOP_COUNT_MAX: u8 = 15;
/// limited by the 3-bit retry field
pub const RETRY_COUNT_MAX: u8 = 7;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, TryFromPrimitive, IntoPrimitive)]
pub enum PacketType {
    /// fire and forget
    #[default]
    Nack = 0,
    /// acknowledged automatically by the destination's mesh engine
    AckRequest = 1,
    /// the destination's application is expected to acknowledge
    AppAckRequest = 2,
    AckResponse = 3,
}
impl PacketType {
    pub fn requires_ack(&self) -> bool {
        matches!(self, PacketType::AckRequest | PacketType::AppAckRequest)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct AddrPair {
    pub src: u8,
    pub dst: u8,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct FrameInfo {
    pub version: u8,
    pub retries_remaining: u8,
    pub pkt_type: PacketType,
    /// hops travelled so far, the originator's transmission counting as 0
    pub hop_count: u8,
    pub hop_count_max: u8,
    pub pkt_seq_num: u8,
    pub data_len: u8,
}

impl FrameInfo {
    const MASK_VERSION: u8 = 0b0000_0111;
    const MASK_RETRIES: u8 = 0b0011_1000;
    const SHIFT_RETRIES: u8 = 3;
    const SHIFT_PKT_TYPE: u8 = 6;
    const MASK_NIBBLE: u8 = 0x0F;

    fn ser(&self, buf: &mut impl BufMut) {
        let pkt_type: u8 = self.pkt_type.into();
        buf.put_u8(
            (self.version & Self::MASK_VERSION)
                | ((self.retries_remaining << Self::SHIFT_RETRIES) & Self::MASK_RETRIES)
                | (pkt_type << Self::SHIFT_PKT_TYPE)
        );
        buf.put_u8((self.hop_count & Self::MASK_NIBBLE) | ((self.hop_count_max & Self::MASK_NIBBLE) << 4));
        buf.put_u8(self.pkt_seq_num);
        buf.put_u8(self.data_len);
    }

    fn deser(buf: &mut impl Buf) -> anyhow::Result<FrameInfo> {
        let flags = buf.get_u8();
        let hops = buf.get_u8();

        // two bits can only ever hold a valid packet type
        let pkt_type = PacketType::try_from(flags >> Self::SHIFT_PKT_TYPE)?;

        Ok(FrameInfo {
            version: flags & Self::MASK_VERSION,
            retries_remaining: (flags & Self::MASK_RETRIES) >> Self::SHIFT_RETRIES,
            pkt_type,
            hop_count: hops & Self::MASK_NIBBLE,
            hop_count_max: hops >> 4,
            pkt_seq_num: buf.get_u8(),
            data_len: buf.get_u8(),
        })
    }
}

/// A single frame as it goes over the air. All multi-bit info fields are packed explicitly, so
///  the layout does not depend on compiler bitfield ordering:
///
/// ```ascii
/// 0: nwk.src      end-to-end source
/// 1: nwk.dst      end-to-end destination, 255 for broadcast
/// 2: mac.src      the node physically transmitting this frame
/// 3: mac.dst      the intended next hop, 0 if unknown
/// 4: bits 0-2 version, bits 3-5 retries remaining, bits 6-7 packet type
/// 5: bits 0-3 hop count, bits 4-7 hop count max
/// 6: sequence number, per source, wrapping
/// 7: data length
/// 8: data (24 bytes, zero padded)
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    pub nwk: AddrPair,
    pub mac: AddrPair,
    pub info: FrameInfo,
    pub data: [u8; DATA_SIZE],
}

impl Frame {
    const OFFSET_INFO: usize = 4;

    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.info.data_len as usize).min(DATA_SIZE)]
    }

    pub fn reader(&self) -> PayloadReader {
        PayloadReader::new(&self.data)
    }

    /// Source, destination and sequence number identify a packet end-to-end, regardless of the
    ///  hop it is currently travelling
    pub fn is_same_packet(&self, other: &Frame) -> bool {
        self.nwk == other.nwk && self.info.pkt_seq_num == other.info.pkt_seq_num
    }

    /// true if the application is expected to acknowledge this frame with
    ///  [crate::node::MeshNode::send_ack]
    pub fn is_ack_required(&self) -> bool {
        self.info.pkt_type == PacketType::AppAckRequest
    }

    /// true if this frame acknowledges a frame that was sent to `sent_dst`
    pub fn is_ack_ok(&self, sent_dst: u8) -> bool {
        self.info.pkt_type == PacketType::AckResponse && self.nwk.src == sent_dst
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.nwk.src);
        buf.put_u8(self.nwk.dst);
        buf.put_u8(self.mac.src);
        buf.put_u8(self.mac.dst);
        self.info.ser(buf);
        buf.put_slice(&self.data);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Frame> {
        if buf.remaining() < FRAME_SIZE {
            bail!("frame has {} bytes, expected {}", buf.remaining(), FRAME_SIZE);
        }

        let nwk = AddrPair { src: buf.get_u8(), dst: buf.get_u8() };
        let mac = AddrPair { src: buf.get_u8(), dst: buf.get_u8() };
        let info = FrameInfo::deser(buf)?;
        if info.data_len as usize > DATA_SIZE {
            bail!("data length {} exceeds the frame's capacity of {}", info.data_len, DATA_SIZE);
        }

        let mut data = [0u8; DATA_SIZE];
        buf.copy_to_slice(&mut data);

        Ok(Frame { nwk, mac, info, data })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut result = [0u8; FRAME_SIZE];
        self.ser(&mut &mut result[..]);
        result
    }

    pub fn from_bytes(raw: &[u8; FRAME_SIZE]) -> anyhow::Result<Frame> {
        Self::deser(&mut &raw[..])
    }

    /// The protocol version of a raw frame. Later versions may change everything after the
    ///  version bits, so this is checked before decoding the rest.
    pub fn version_of(raw: &[u8; FRAME_SIZE]) -> u8 {
        raw[Self::OFFSET_INFO] & FrameInfo::MASK_VERSION
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NWK {}/{} MAC {}/{} HOPS {}/{} SEQ {} RT {} {:?}",
               self.nwk.src, self.nwk.dst,
               self.mac.src, self.mac.dst,
               self.info.hop_count, self.info.hop_count_max,
               self.info.pkt_seq_num, self.info.retries_remaining,
               self.info.pkt_type,
        )
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FRAME{{{}: {:?}}}", self, self.payload())
    }
}
