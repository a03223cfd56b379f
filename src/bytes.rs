//! Bounds-checked big-endian reads over a message body.

use byteorder::{BigEndian, ByteOrder};

use crate::error::CodecError;

/// A byte-level reader for decoding OpenFlow wire data.
///
/// Every read is bounds-checked and reports `BufferUnderrun` instead of
/// panicking on truncated input.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> ByteCursor<'a> {
        ByteCursor { buf, pos: 0 }
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Number of bytes read so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        if needed > self.remaining() {
            return Err(CodecError::BufferUnderrun {
                needed,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let slice = self.take(1)?;
        Ok(slice[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let slice = self.take(2)?;
        Ok(BigEndian::read_u16(slice))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let slice = self.take(4)?;
        Ok(BigEndian::read_u32(slice))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let slice = self.take(8)?;
        Ok(BigEndian::read_u64(slice))
    }

    /// Read a 6-byte hardware address.
    pub fn read_mac(&mut self) -> Result<[u8; 6], CodecError> {
        let slice = self.take(6)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(slice);
        Ok(mac)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    /// Skip over `n` bytes of padding.
    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.take(n).map(|_| ())
    }

    /// Consume and return everything left in the buffer.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}
