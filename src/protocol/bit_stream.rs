use anyhow::bail;
use bytes::{BufMut, Bytes, BytesMut};

/// Bit-precision write cursor. Bits are packed MSB-first into successive
///  bytes; multi-byte integers are written little-endian, byte by byte. A
///  partially filled last byte is zero-padded.
pub struct BitWriter {
    buf: BytesMut,
    /// number of bits used in the last byte of `buf`; 0 means byte-aligned
    partial_bits: usize,
}

impl BitWriter {
    pub fn new() -> BitWriter {
        BitWriter {
            buf: BytesMut::new(),
            partial_bits: 0,
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.partial_bits == 0 {
            self.buf.put_u8(0);
        }
        if bit {
            let last = self.buf.len() - 1;
            self.buf[last] |= 1 << (7 - self.partial_bits);
        }
        self.partial_bits = (self.partial_bits + 1) % 8;
    }

    /// writes the `count` least significant bits of `value`, MSB-first
    fn write_bits(&mut self, value: u8, count: usize) {
        for i in (0..count).rev() {
            self.write_bit(value & (1 << i) != 0);
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        if self.partial_bits == 0 {
            self.buf.put_u8(value);
        } else {
            self.write_bits(value, 8);
        }
    }

    /// the cursor's fixed-width "long" primitive
    pub fn write_i32(&mut self, value: i32) {
        for b in value.to_le_bytes() {
            self.write_u8(b);
        }
    }

    /// Variable-length encoding for small counts: a leading flag bit says
    ///  whether the high byte is zero; if it is, a second flag bit says
    ///  whether the low byte fits into a nibble.
    pub fn write_compressed_u16(&mut self, value: u16) {
        let lo = value as u8;
        let hi = (value >> 8) as u8;

        if hi != 0 {
            self.write_bit(false);
            self.write_u8(lo);
            self.write_u8(hi);
            return;
        }
        self.write_bit(true);

        if lo & 0xF0 == 0 {
            self.write_bit(true);
            self.write_bits(lo, 4);
        } else {
            self.write_bit(false);
            self.write_u8(lo);
        }
    }

    pub fn bit_len(&self) -> usize {
        match self.partial_bits {
            0 => self.buf.len() * 8,
            n => (self.buf.len() - 1) * 8 + n,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read counterpart of [BitWriter]. Running off the end of the underlying
///  buffer is an error, never a panic.
pub struct BitReader<'a> {
    buf: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> BitReader<'a> {
        BitReader { buf, bit_pos: 0 }
    }

    pub fn read_bit(&mut self) -> anyhow::Result<bool> {
        let byte_pos = self.bit_pos / 8;
        if byte_pos >= self.buf.len() {
            bail!("bit stream underflow");
        }
        let bit = self.buf[byte_pos] & (1 << (7 - self.bit_pos % 8)) != 0;
        self.bit_pos += 1;
        Ok(bit)
    }

    fn read_bits(&mut self, count: usize) -> anyhow::Result<u8> {
        let mut result = 0u8;
        for _ in 0..count {
            result = (result << 1) | self.read_bit()? as u8;
        }
        Ok(result)
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        if self.bit_pos % 8 == 0 {
            let byte_pos = self.bit_pos / 8;
            if byte_pos >= self.buf.len() {
                bail!("bit stream underflow");
            }
            self.bit_pos += 8;
            Ok(self.buf[byte_pos])
        } else {
            self.read_bits(8)
        }
    }

    pub fn read_i32(&mut self) -> anyhow::Result<i32> {
        let mut bytes = [0u8; 4];
        for b in bytes.iter_mut() {
            *b = self.read_u8()?;
        }
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_compressed_u16(&mut self) -> anyhow::Result<u16> {
        if !self.read_bit()? {
            let lo = self.read_u8()?;
            let hi = self.read_u8()?;
            return Ok(u16::from(lo) | u16::from(hi) << 8);
        }
        if self.read_bit()? {
            Ok(u16::from(self.read_bits(4)?))
        } else {
            Ok(u16::from(self.read_u8()?))
        }
    }
}
