//! Bit cursor over a byte slice.
//!
//! Bits are addressed MSB-first: bit 0 is the high bit of the first byte, and multi-bit reads
//! are big-endian. The cursor only moves forward. A limit (initially the end of the buffer)
//! bounds every read; [`BitCursor::narrow`] shrinks it for a sized sub-message and
//! [`BitCursor::restore`] widens it back afterwards.

use crate::error::CursorError;
use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    pos: u64,
    limit: u64,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitCursor {
            data,
            pos: 0,
            limit: data.len() as u64 * 8,
        }
    }

    /// Absolute bit offset of the next read.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining_bits(&self) -> u64 {
        self.limit - self.pos
    }

    pub fn is_aligned(&self) -> bool {
        self.pos % 8 == 0
    }

    fn ensure(&self, n: u64) -> Result<(), CursorError> {
        let remaining = self.remaining_bits();
        if n > remaining {
            return Err(CursorError::OutOfData {
                requested: n,
                remaining,
            });
        }
        Ok(())
    }

    /// Reads `n` bits (1..=64) as an unsigned big-endian integer.
    pub fn read_bits(&mut self, n: u64) -> Result<u64, CursorError> {
        if n == 0 || n > 64 {
            return Err(CursorError::InvalidWidth { bits: n });
        }
        self.ensure(n)?;
        let value = if self.is_aligned() && n % 8 == 0 {
            let start = (self.pos / 8) as usize;
            let bytes = &self.data[start..start + (n / 8) as usize];
            match n {
                8 => bytes[0] as u64,
                16 => BigEndian::read_u16(bytes) as u64,
                32 => BigEndian::read_u32(bytes) as u64,
                64 => BigEndian::read_u64(bytes),
                _ => BigEndian::read_uint(bytes, bytes.len()),
            }
        } else {
            let mut value = 0u64;
            for i in 0..n {
                let bit = self.pos + i;
                let byte = self.data[(bit / 8) as usize];
                value = (value << 1) | ((byte >> (7 - (bit % 8))) & 1) as u64;
            }
            value
        };
        self.pos += n;
        Ok(value)
    }

    /// Reads `n` whole octets starting at the current (possibly unaligned) position.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, CursorError> {
        let bits = n as u64 * 8;
        self.ensure(bits)?;
        if self.is_aligned() {
            let start = (self.pos / 8) as usize;
            self.pos += bits;
            return Ok(self.data[start..start + n].to_vec());
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    /// Limits reads to `bits` bits from the current position. Returns the previous limit,
    /// which must be handed back to [`BitCursor::restore`].
    pub fn narrow(&mut self, bits: u64) -> Result<u64, CursorError> {
        self.ensure(bits)?;
        let outer = self.limit;
        self.limit = self.pos + bits;
        Ok(outer)
    }

    pub fn restore(&mut self, limit: u64) {
        debug_assert!(limit >= self.limit);
        self.limit = limit;
    }
}
