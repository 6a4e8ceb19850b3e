// Per-diff codec header.
//
// Layout (24 bits, byte aligned):
//   3 bits  codec-data marker (action code 0)
//   5 bits  width of start offsets        (S)
//   5 bits  width of lengths              (E)
//   5 bits  width of block ids            (B)
//   5 bits  width of text byte lengths    (L)
//   1 bit   zero padding
//
// Widths are shared by every part of the diff.

use std::fmt;

use super::action::{ACTION_BITS, Action};
use super::bits::{BitReader, BitWriter};
use super::decoder::DecodeError;
use super::encoder::EncodeError;

/// Bits used to store one field width.
pub const WIDTH_BITS: u32 = 5;

/// Largest width a header may declare.
pub const MAX_WIDTH: u8 = 31;

/// Largest value any numeric field may carry.
pub const MAX_FIELD_VALUE: usize = (1 << 31) - 1;

/// Header length in bytes.
pub const HEADER_BYTES: usize = 3;

/// The four numeric field kinds of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Start,
    Length,
    BlockId,
    TextLength,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Start => "start",
            Field::Length => "length",
            Field::BlockId => "block id",
            Field::TextLength => "text length",
        })
    }
}

/// Number of significant bits in `value` (0 for 0).
#[inline]
pub fn bits_for(value: usize) -> u8 {
    (usize::BITS - value.leading_zeros()) as u8
}

// ---------------------------------------------------------------------------
// RevisionCodecData
// ---------------------------------------------------------------------------

/// Field widths chosen for one diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RevisionCodecData {
    pub start_bits: u8,
    pub length_bits: u8,
    pub block_bits: u8,
    pub text_bits: u8,
}

impl RevisionCodecData {
    pub fn width(&self, field: Field) -> u32 {
        u32::from(match field {
            Field::Start => self.start_bits,
            Field::Length => self.length_bits,
            Field::BlockId => self.block_bits,
            Field::TextLength => self.text_bits,
        })
    }

    /// Widen `field` so that `value` fits.
    pub fn observe(&mut self, field: Field, value: usize) -> Result<(), EncodeError> {
        if value > MAX_FIELD_VALUE {
            return Err(EncodeError::FieldOverflow { field, value });
        }
        let bits = bits_for(value);
        let slot = match field {
            Field::Start => &mut self.start_bits,
            Field::Length => &mut self.length_bits,
            Field::BlockId => &mut self.block_bits,
            Field::TextLength => &mut self.text_bits,
        };
        *slot = (*slot).max(bits);
        Ok(())
    }

    /// True when `value` is representable in the declared width.
    pub fn fits(&self, field: Field, value: usize) -> bool {
        bits_for(value) as u32 <= self.width(field)
    }

    pub fn write(&self, w: &mut BitWriter) -> Result<(), EncodeError> {
        w.write_bits(Action::CodecData.code(), ACTION_BITS)?;
        for width in [self.start_bits, self.length_bits, self.block_bits, self.text_bits] {
            w.write_bits(u32::from(width), WIDTH_BITS)?;
        }
        w.write_bit(false);
        Ok(())
    }

    pub fn read(r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        let marker = r.read_bits(ACTION_BITS).map_err(DecodeError::truncated("header"))?;
        if marker != Action::CodecData.code() {
            return Err(DecodeError::InvalidMarker(marker));
        }
        let mut widths = [0u8; 4];
        for width in &mut widths {
            let value = r.read_bits(WIDTH_BITS).map_err(DecodeError::truncated("header"))?;
            if value > u32::from(MAX_WIDTH) {
                return Err(DecodeError::WidthOutOfRange(value));
            }
            *width = value as u8;
        }
        r.read_bit().map_err(DecodeError::truncated("header"))?;
        let [start_bits, length_bits, block_bits, text_bits] = widths;
        Ok(Self {
            start_bits,
            length_bits,
            block_bits,
            text_bits,
        })
    }
}

impl fmt::Display for RevisionCodecData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "S={} E={} B={} L={}",
            self.start_bits, self.length_bits, self.block_bits, self.text_bits
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_counts() {
        assert_eq!(bits_for(0), 0);
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(255), 8);
        assert_eq!(bits_for(256), 9);
        assert_eq!(bits_for(MAX_FIELD_VALUE), 31);
    }

    #[test]
    fn observe_keeps_maximum_width() {
        let mut data = RevisionCodecData::default();
        data.observe(Field::Start, 1000).unwrap();
        data.observe(Field::Start, 3).unwrap();
        data.observe(Field::TextLength, 6).unwrap();
        assert_eq!(data.start_bits, 10);
        assert_eq!(data.text_bits, 3);
        assert_eq!(data.length_bits, 0);
        assert!(data.fits(Field::Start, 1023));
        assert!(!data.fits(Field::Start, 1024));
        assert!(data.fits(Field::BlockId, 0));
    }

    #[test]
    fn observe_rejects_values_past_31_bits() {
        let mut data = RevisionCodecData::default();
        let err = data.observe(Field::Length, MAX_FIELD_VALUE + 1).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::FieldOverflow {
                field: Field::Length,
                ..
            }
        ));
    }

    #[test]
    fn header_is_three_bytes() {
        let data = RevisionCodecData {
            start_bits: 31,
            length_bits: 0,
            block_bits: 7,
            text_bits: 12,
        };
        let mut w = BitWriter::new();
        data.write(&mut w).unwrap();
        assert!(w.is_aligned());
        let bytes = w.finish();
        assert_eq!(bytes.len(), HEADER_BYTES);
        assert!(bytes[0] < 0x20, "marker bits must be zero");

        let mut r = BitReader::new(&bytes);
        assert_eq!(RevisionCodecData::read(&mut r).unwrap(), data);
    }

    #[test]
    fn header_rejects_wrong_marker() {
        let bytes = [0b1010_0000u8, 0, 0];
        let mut r = BitReader::new(&bytes);
        assert_eq!(
            RevisionCodecData::read(&mut r),
            Err(DecodeError::InvalidMarker(0b101))
        );
    }
}
