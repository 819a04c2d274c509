use anyhow::bail;
use bytes::{Buf, BufMut};

use crate::frame::DATA_SIZE;

/// Builds a frame's payload from typed values, failing instead of overflowing the 24 bytes
///  available. Numbers are written little-endian.
#[derive(Debug, Clone, Default)]
pub struct PayloadWriter {
    buf: [u8; DATA_SIZE],
    len: usize,
}

impl PayloadWriter {
    pub fn new() -> PayloadWriter {
        PayloadWriter::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        DATA_SIZE - self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn reserve(&mut self, num_bytes: usize) -> anyhow::Result<&mut [u8]> {
        if num_bytes > self.remaining() {
            bail!("payload overflow: {} bytes used, {} more requested", self.len, num_bytes);
        }
        let start = self.len;
        self.len += num_bytes;
        Ok(&mut self.buf[start..self.len])
    }

    pub fn put_slice(&mut self, value: &[u8]) -> anyhow::Result<&mut Self> {
        self.reserve(value.len())?.copy_from_slice(value);
        Ok(self)
    }

    pub fn put_u8(&mut self, value: u8) -> anyhow::Result<&mut Self> {
        self.reserve(1)?.put_u8(value);
        Ok(self)
    }

    pub fn put_u16(&mut self, value: u16) -> anyhow::Result<&mut Self> {
        self.reserve(2)?.put_u16_le(value);
        Ok(self)
    }

    pub fn put_u32(&mut self, value: u32) -> anyhow::Result<&mut Self> {
        self.reserve(4)?.put_u32_le(value);
        Ok(self)
    }

    pub fn put_i16(&mut self, value: i16) -> anyhow::Result<&mut Self> {
        self.reserve(2)?.put_i16_le(value);
        Ok(self)
    }

    pub fn put_i32(&mut self, value: i32) -> anyhow::Result<&mut Self> {
        self.reserve(4)?.put_i32_le(value);
        Ok(self)
    }

    pub fn put_f32(&mut self, value: f32) -> anyhow::Result<&mut Self> {
        self.reserve(4)?.put_f32_le(value);
        Ok(self)
    }
}

/// Reads typed values from a frame's data area in sequence. Reads are bounded by the 24 byte
///  data area rather than the frame's data length, matching the fixed layout senders use.
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl <'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8; DATA_SIZE]) -> PayloadReader<'a> {
        PayloadReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, num_bytes: usize) -> anyhow::Result<&'a [u8]> {
        if num_bytes > self.remaining() {
            bail!("payload underflow: {} bytes read, {} more requested", self.pos, num_bytes);
        }
        let start = self.pos;
        self.pos += num_bytes;
        Ok(&self.data[start..self.pos])
    }

    /// skip a field the caller is not interested in
    pub fn skip(&mut self, num_bytes: usize) -> anyhow::Result<()> {
        self.take(num_bytes)?;
        Ok(())
    }

    pub fn copy_to_slice(&mut self, dst: &mut [u8]) -> anyhow::Result<()> {
        dst.copy_from_slice(self.take(dst.len())?);
        Ok(())
    }

    pub fn get_u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.take(1)?.get_u8())
    }

    pub fn get_u16(&mut self) -> anyhow::Result<u16> {
        Ok(self.take(2)?.get_u16_le())
    }

    pub fn get_u32(&mut self) -> anyhow::Result<u32> {
        Ok(self.take(4)?.get_u32_le())
    }

    pub fn get_i16(&mut self) -> anyhow::Result<i16> {
        Ok(self.take(2)?.get_i16_le())
    }

    pub fn get_i32(&mut self) -> anyhow::Result<i32> {
        Ok(self.take(4)?.get_i32_le())
    }

    pub fn get_f32(&mut self) -> anyhow::Result<f32> {
        Ok(self.take(4)?.get_f32_le())
    }
}
