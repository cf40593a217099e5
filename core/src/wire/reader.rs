//! Positioned big-endian cursor over a byte slice.
//!
//! Every multi-byte integer in the game's framing layer is big-endian,
//! so only BE primitives are provided. All reads are bounds-checked and
//! return [`WireError::OutOfBounds`] instead of panicking; the capture
//! pipeline must survive arbitrary bytes off the wire.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("read of {requested} bytes at offset {position} exceeds buffer of {len}")]
    OutOfBounds {
        position: usize,
        requested: usize,
        len: usize,
    },
    #[error("varint exceeds 10 bytes")]
    VarintOverflow,
}

pub type WireResult<T> = Result<T, WireError>;

/// Read cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn check(&self, n: usize) -> WireResult<()> {
        if n > self.remaining() {
            return Err(WireError::OutOfBounds {
                position: self.pos,
                requested: n,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    /// Peek a big-endian u32 without advancing the cursor.
    pub fn peek_u32_be(&self) -> WireResult<u32> {
        self.check(4)?;
        let b = &self.data[self.pos..self.pos + 4];
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        self.check(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16_be(&mut self) -> WireResult<u16> {
        self.check(2)?;
        let b = &self.data[self.pos..self.pos + 2];
        self.pos += 2;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32_be(&mut self) -> WireResult<u32> {
        self.check(4)?;
        let b = &self.data[self.pos..self.pos + 4];
        self.pos += 4;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64_be(&mut self) -> WireResult<u64> {
        self.check(8)?;
        let b = &self.data[self.pos..self.pos + 8];
        self.pos += 8;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_bytes(&mut self, n: usize) -> WireResult<&'a [u8]> {
        self.check(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> WireResult<()> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// Consume and return everything from the cursor to the end.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}
