// Bit-level reader and writer over byte buffers.
//
// Bits are packed MSB-first: the first bit written lands in bit 7 of the
// first byte. Fixed-width fields never exceed 32 bits. Reading past the end
// is an explicit `BitError::EndOfStream`, never a sentinel value.

use thiserror::Error;

/// Widest field either side accepts in one call.
pub const MAX_FIELD_BITS: u32 = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BitError {
    /// Fewer bits remain than the read asked for.
    #[error("end of bit stream: {requested} bits requested, {available} available")]
    EndOfStream { requested: u32, available: usize },
    #[error("field width {0} exceeds {MAX_FIELD_BITS} bits")]
    WidthTooLarge(u32),
    #[error("value {value} does not fit in {width} bits")]
    ValueOverflow { value: u32, width: u32 },
}

#[inline]
fn low_mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

// ---------------------------------------------------------------------------
// BitWriter
// ---------------------------------------------------------------------------

/// Appends fixed-width bit fields to a growing byte buffer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    buf: Vec<u8>,
    /// Partially filled byte; only the top `used` bits are meaningful.
    current: u8,
    used: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            current: 0,
            used: 0,
        }
    }

    /// Write the low `width` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, width: u32) -> Result<(), BitError> {
        if width > MAX_FIELD_BITS {
            return Err(BitError::WidthTooLarge(width));
        }
        if value & !low_mask(width) != 0 {
            return Err(BitError::ValueOverflow { value, width });
        }

        let mut left = width;
        while left > 0 {
            let free = 8 - self.used;
            let take = free.min(left);
            let bits = (value >> (left - take)) & low_mask(take);
            self.current |= (bits << (free - take)) as u8;
            self.used += take;
            left -= take;
            if self.used == 8 {
                self.buf.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
        Ok(())
    }

    pub fn write_bit(&mut self, bit: bool) {
        // A single bit always fits.
        let _ = self.write_bits(u32::from(bit), 1);
    }

    /// Write raw bytes. Aligned writes copy the slice directly.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.is_aligned() {
            self.buf.extend_from_slice(bytes);
            return;
        }
        for &b in bytes {
            let _ = self.write_bits(u32::from(b), 8);
        }
    }

    /// Zero-fill up to the next byte boundary (no-op when aligned).
    pub fn pad_to_byte(&mut self) {
        if self.used > 0 {
            self.buf.push(self.current);
            self.current = 0;
            self.used = 0;
        }
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.used == 0
    }

    /// Total number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8 + self.used as usize
    }

    /// Pad the trailing byte and return the buffer.
    pub fn finish(mut self) -> Vec<u8> {
        self.pad_to_byte();
        self.buf
    }
}

// ---------------------------------------------------------------------------
// BitReader
// ---------------------------------------------------------------------------

/// Reads fixed-width bit fields from a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit position of the next bit to read.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bits left before the end of the buffer.
    #[inline]
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.pos % 8 == 0
    }

    pub fn bit_position(&self) -> usize {
        self.pos
    }

    /// Read a `width`-bit field, most significant bit first.
    pub fn read_bits(&mut self, width: u32) -> Result<u32, BitError> {
        if width > MAX_FIELD_BITS {
            return Err(BitError::WidthTooLarge(width));
        }
        let available = self.remaining_bits();
        if width as usize > available {
            return Err(BitError::EndOfStream {
                requested: width,
                available,
            });
        }

        let mut value: u64 = 0;
        let mut left = width;
        while left > 0 {
            let byte = self.data[self.pos / 8];
            let offset = (self.pos % 8) as u32;
            let free = 8 - offset;
            let take = free.min(left);
            let bits = (u32::from(byte) >> (free - take)) & low_mask(take);
            value = (value << take) | u64::from(bits);
            self.pos += take as usize;
            left -= take;
        }
        Ok(value as u32)
    }

    pub fn read_bit(&mut self) -> Result<bool, BitError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Read `len` raw bytes. Aligned reads borrow-copy the slice directly.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, BitError> {
        let available = self.remaining_bits();
        if len.saturating_mul(8) > available {
            return Err(BitError::EndOfStream {
                requested: u32::try_from(len.saturating_mul(8)).unwrap_or(u32::MAX),
                available,
            });
        }
        if self.is_aligned() {
            let start = self.pos / 8;
            self.pos += len * 8;
            return Ok(self.data[start..start + len].to_vec());
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    /// Skip to the next byte boundary (no-op when aligned).
    pub fn skip_to_byte(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }

    /// True when only the writer's zero fill is left: fewer than 8 bits,
    /// all of them zero.
    pub fn at_padding(&self) -> bool {
        let remaining = self.remaining_bits();
        if remaining == 0 {
            return true;
        }
        if remaining >= 8 {
            return false;
        }
        let last = self.data[self.data.len() - 1];
        u32::from(last) & low_mask(remaining as u32) == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
