// Diff -> bit-packed body.
//
// Two passes: the first encodes every text payload and widens the header
// fields to the largest value each field carries, rejecting values past
// 31 bits before anything is written. The second writes the header and
// the parts at the shared widths:
//
//   FULL     code L text
//   INSERT   code S L text
//   DELETE   code S E pad
//   REPLACE  code S E L text
//   CUT      code S E B pad
//   PASTE    code S B pad
//
// The final partial byte is zero filled.

use thiserror::Error;

use super::action::{ACTION_BITS, Action};
use super::bits::{BitError, BitWriter};
use super::header::{Field, HEADER_BYTES, RevisionCodecData};
use super::text::TextCharset;
use crate::diff::DiffPart;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{field} value {value} exceeds the 31-bit field ceiling")]
    FieldOverflow { field: Field, value: usize },
    #[error("part {index} holds text that {charset} cannot encode")]
    UnencodableText { index: usize, charset: TextCharset },
    #[error("bit writer: {0}")]
    Bits(#[from] BitError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encoded text payload per part (`None` for parts without text).
type EncodedTexts = Vec<Option<Vec<u8>>>;

/// Scan `parts` and compute the field widths the body needs.
pub fn codec_data(parts: &[DiffPart], charset: TextCharset) -> Result<RevisionCodecData, EncodeError> {
    prepare(parts, charset).map(|(data, _)| data)
}

fn prepare(
    parts: &[DiffPart],
    charset: TextCharset,
) -> Result<(RevisionCodecData, EncodedTexts), EncodeError> {
    let mut data = RevisionCodecData::default();
    let mut texts = Vec::with_capacity(parts.len());

    for (index, part) in parts.iter().enumerate() {
        let encoded = match part.text() {
            Some(text) => Some(
                charset
                    .encode(text)
                    .ok_or(EncodeError::UnencodableText { index, charset })?,
            ),
            None => None,
        };
        if let Some(bytes) = &encoded {
            data.observe(Field::TextLength, bytes.len())?;
        }

        match *part {
            DiffPart::FullRevision { .. } => {}
            DiffPart::Insert { start, .. } => {
                data.observe(Field::Start, start)?;
            }
            DiffPart::Delete { start, length } | DiffPart::Replace { start, length, .. } => {
                data.observe(Field::Start, start)?;
                data.observe(Field::Length, length)?;
            }
            DiffPart::Cut {
                start,
                length,
                block_id,
            } => {
                data.observe(Field::Start, start)?;
                data.observe(Field::Length, length)?;
                data.observe(Field::BlockId, block_id)?;
            }
            DiffPart::Paste { start, block_id } => {
                data.observe(Field::Start, start)?;
                data.observe(Field::BlockId, block_id)?;
            }
        }
        texts.push(encoded);
    }
    Ok((data, texts))
}

/// Encode `parts` into a bit-packed body.
pub fn encode_parts(parts: &[DiffPart], charset: TextCharset) -> Result<Vec<u8>, EncodeError> {
    let (data, texts) = prepare(parts, charset)?;

    let text_bytes: usize = texts.iter().flatten().map(Vec::len).sum();
    let mut w = BitWriter::with_capacity(HEADER_BYTES + parts.len() * 8 + text_bytes);
    data.write(&mut w)?;

    for (part, text) in parts.iter().zip(&texts) {
        write_part(&mut w, &data, part, text.as_deref().unwrap_or_default())?;
    }
    Ok(w.finish())
}

fn write_field(
    w: &mut BitWriter,
    data: &RevisionCodecData,
    field: Field,
    value: usize,
) -> Result<(), EncodeError> {
    // `prepare` bounded every value to 31 bits and widened `data` to fit.
    w.write_bits(value as u32, data.width(field))?;
    Ok(())
}

fn write_part(
    w: &mut BitWriter,
    data: &RevisionCodecData,
    part: &DiffPart,
    text: &[u8],
) -> Result<(), EncodeError> {
    w.write_bits(Action::of(part).code(), ACTION_BITS)?;
    match *part {
        DiffPart::FullRevision { .. } => {
            write_field(w, data, Field::TextLength, text.len())?;
            w.write_bytes(text);
        }
        DiffPart::Insert { start, .. } => {
            write_field(w, data, Field::Start, start)?;
            write_field(w, data, Field::TextLength, text.len())?;
            w.write_bytes(text);
        }
        DiffPart::Delete { start, length } => {
            write_field(w, data, Field::Start, start)?;
            write_field(w, data, Field::Length, length)?;
            w.pad_to_byte();
        }
        DiffPart::Replace { start, length, .. } => {
            write_field(w, data, Field::Start, start)?;
            write_field(w, data, Field::Length, length)?;
            write_field(w, data, Field::TextLength, text.len())?;
            w.write_bytes(text);
        }
        DiffPart::Cut {
            start,
            length,
            block_id,
        } => {
            write_field(w, data, Field::Start, start)?;
            write_field(w, data, Field::Length, length)?;
            write_field(w, data, Field::BlockId, block_id)?;
            w.pad_to_byte();
        }
        DiffPart::Paste { start, block_id } => {
            write_field(w, data, Field::Start, start)?;
            write_field(w, data, Field::BlockId, block_id)?;
            w.pad_to_byte();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::MAX_FIELD_VALUE;
    use crate::revision::RevisionText;

    #[test]
    fn empty_diff_is_header_only() {
        let bytes = encode_parts(&[], TextCharset::Utf8).unwrap();
        assert_eq!(bytes, vec![0, 0, 0]);
    }

    #[test]
    fn delete_layout() {
        // start=5 (3 bits), length=2 (2 bits).
        let parts = [DiffPart::Delete {
            start: 5,
            length: 2,
        }];
        let bytes = encode_parts(&parts, TextCharset::Utf8).unwrap();
        // header: 000 00011 00010 00000 00000 0
        assert_eq!(&bytes[..3], &[0b0000_0011, 0b0001_0000, 0b0000_0000]);
        // part: 011 101 10 -> one byte, already aligned
        assert_eq!(&bytes[3..], &[0b0111_0110]);
    }

    #[test]
    fn widths_cover_every_part() {
        let parts = vec![
            DiffPart::Insert {
                start: 700,
                text: RevisionText::from("abc"),
            },
            DiffPart::Cut {
                start: 3,
                length: 40,
                block_id: 9,
            },
            DiffPart::Paste {
                start: 1,
                block_id: 9,
            },
        ];
        let data = codec_data(&parts, TextCharset::Utf8).unwrap();
        assert_eq!(data.start_bits, 10);
        assert_eq!(data.length_bits, 6);
        assert_eq!(data.block_bits, 4);
        assert_eq!(data.text_bits, 2);
    }

    #[test]
    fn text_length_counts_encoded_bytes() {
        let parts = [DiffPart::FullRevision {
            text: RevisionText::from("é"),
        }];
        let utf8 = codec_data(&parts, TextCharset::Utf8).unwrap();
        let utf16 = codec_data(&parts, TextCharset::Utf16Le).unwrap();
        assert_eq!(utf8.text_bits, 2); // 2 bytes
        assert_eq!(utf16.text_bits, 2); // 2 bytes
        let parts = [DiffPart::FullRevision {
            text: RevisionText::from("€"),
        }];
        assert_eq!(codec_data(&parts, TextCharset::Utf8).unwrap().text_bits, 2); // 3 bytes
    }

    #[test]
    fn oversized_field_rejected_before_output() {
        let parts = [DiffPart::Delete {
            start: MAX_FIELD_VALUE + 1,
            length: 1,
        }];
        assert!(matches!(
            encode_parts(&parts, TextCharset::Utf8),
            Err(EncodeError::FieldOverflow {
                field: Field::Start,
                ..
            })
        ));
    }

    #[test]
    fn unpaired_surrogate_is_unencodable_in_utf8() {
        let parts = [DiffPart::Insert {
            start: 0,
            text: RevisionText::from_units(vec![0xD801]),
        }];
        assert!(matches!(
            encode_parts(&parts, TextCharset::Utf8),
            Err(EncodeError::UnencodableText { index: 0, .. })
        ));
        assert!(encode_parts(&parts, TextCharset::Utf16Be).is_ok());
    }
}
