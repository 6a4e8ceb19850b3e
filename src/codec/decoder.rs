// Bit-packed body -> diff parts.
//
// Exact inverse of the encoder. The body ends when fewer than three bits
// remain or when only the writer's zero fill is left; since no part uses
// action code 0, a zero fill can never be mistaken for an operation.

use thiserror::Error;

use super::action::{ACTION_BITS, Action};
use super::bits::{BitError, BitReader};
use super::header::{Field, RevisionCodecData};
use super::text::TextCharset;
use crate::diff::DiffPart;
use crate::revision::RevisionText;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("truncated {context}: {source}")]
    Truncated {
        context: &'static str,
        #[source]
        source: BitError,
    },
    #[error("expected codec marker, found action code {0}")]
    InvalidMarker(u32),
    #[error("header declares field width {0} (max 31)")]
    WidthOutOfRange(u32),
    #[error("unrecognized action code {code} at bit {bit_offset}")]
    UnknownAction { code: u32, bit_offset: usize },
    #[error("invalid text in part {index}: {message}")]
    InvalidText { index: usize, message: String },
    #[error("inflate failed: {0}")]
    Inflate(String),
    #[error("invalid base64 transport: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl DecodeError {
    pub(crate) fn truncated(context: &'static str) -> impl Fn(BitError) -> DecodeError {
        move |source| DecodeError::Truncated { context, source }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a bit-packed body into its header and parts.
pub fn decode_parts(
    body: &[u8],
    charset: TextCharset,
) -> Result<(RevisionCodecData, Vec<DiffPart>), DecodeError> {
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut r = BitReader::new(body);
    let data = RevisionCodecData::read(&mut r)?;

    let mut parts = Vec::new();
    loop {
        if r.remaining_bits() < ACTION_BITS as usize || r.at_padding() {
            break;
        }
        let bit_offset = r.bit_position();
        let code = r
            .read_bits(ACTION_BITS)
            .map_err(DecodeError::truncated("action"))?;
        let index = parts.len();
        parts.push(read_part(&mut r, &data, code, bit_offset, index, charset)?);
    }
    Ok((data, parts))
}

fn read_field(
    r: &mut BitReader<'_>,
    data: &RevisionCodecData,
    field: Field,
) -> Result<usize, DecodeError> {
    let value = r
        .read_bits(data.width(field))
        .map_err(DecodeError::truncated("operand"))?;
    Ok(value as usize)
}

fn read_text(
    r: &mut BitReader<'_>,
    data: &RevisionCodecData,
    index: usize,
    charset: TextCharset,
) -> Result<RevisionText, DecodeError> {
    let len = read_field(r, data, Field::TextLength)?;
    let bytes = r.read_bytes(len).map_err(DecodeError::truncated("text"))?;
    charset
        .decode(&bytes)
        .map_err(|message| DecodeError::InvalidText { index, message })
}

fn read_part(
    r: &mut BitReader<'_>,
    data: &RevisionCodecData,
    code: u32,
    bit_offset: usize,
    index: usize,
    charset: TextCharset,
) -> Result<DiffPart, DecodeError> {
    let part = match Action::from_code(code) {
        Some(Action::FullRevision) => DiffPart::FullRevision {
            text: read_text(r, data, index, charset)?,
        },
        Some(Action::Insert) => {
            let start = read_field(r, data, Field::Start)?;
            let text = read_text(r, data, index, charset)?;
            DiffPart::Insert { start, text }
        }
        Some(Action::Delete) => {
            let start = read_field(r, data, Field::Start)?;
            let length = read_field(r, data, Field::Length)?;
            r.skip_to_byte();
            DiffPart::Delete { start, length }
        }
        Some(Action::Replace) => {
            let start = read_field(r, data, Field::Start)?;
            let length = read_field(r, data, Field::Length)?;
            let text = read_text(r, data, index, charset)?;
            DiffPart::Replace {
                start,
                length,
                text,
            }
        }
        Some(Action::Cut) => {
            let start = read_field(r, data, Field::Start)?;
            let length = read_field(r, data, Field::Length)?;
            let block_id = read_field(r, data, Field::BlockId)?;
            r.skip_to_byte();
            DiffPart::Cut {
                start,
                length,
                block_id,
            }
        }
        Some(Action::Paste) => {
            let start = read_field(r, data, Field::Start)?;
            let block_id = read_field(r, data, Field::BlockId)?;
            r.skip_to_byte();
            DiffPart::Paste { start, block_id }
        }
        Some(Action::CodecData) | None => {
            return Err(DecodeError::UnknownAction { code, bit_offset });
        }
    };
    Ok(part)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encoder::encode_parts;

    fn sample_parts() -> Vec<DiffPart> {
        vec![
            DiffPart::Paste {
                start: 0,
                block_id: 2,
            },
            DiffPart::Insert {
                start: 17,
                text: RevisionText::from("inserted"),
            },
            DiffPart::Delete {
                start: 30,
                length: 4,
            },
            DiffPart::Replace {
                start: 41,
                length: 3,
                text: RevisionText::from("ü\u{1F600}"),
            },
            DiffPart::Cut {
                start: 60,
                length: 25,
                block_id: 2,
            },
        ]
    }

    #[test]
    fn decode_inverts_encode() {
        for charset in [TextCharset::Utf8, TextCharset::Utf16Le] {
            let parts = sample_parts();
            let body = encode_parts(&parts, charset).unwrap();
            let (data, decoded) = decode_parts(&body, charset).unwrap();
            assert_eq!(decoded, parts);
            assert_eq!(data.block_bits, 2);
        }
    }

    #[test]
    fn header_only_body_has_no_parts() {
        let (_, parts) = decode_parts(&[0, 0, 0], TextCharset::Utf8).unwrap();
        assert!(parts.is_empty());
    }

    #[test]
    fn empty_body_is_rejected() {
        assert_eq!(decode_parts(&[], TextCharset::Utf8), Err(DecodeError::Empty));
    }

    #[test]
    fn unassigned_action_code_is_rejected() {
        // header with zero widths, then code 7
        let body = [0, 0, 0, 0b1110_0000, 0xFF];
        assert_eq!(
            decode_parts(&body, TextCharset::Utf8),
            Err(DecodeError::UnknownAction {
                code: 7,
                bit_offset: 24
            })
        );
    }

    #[test]
    fn codec_marker_inside_body_is_rejected() {
        let body = [0, 0, 0, 0b0000_0000, 0x01];
        assert!(matches!(
            decode_parts(&body, TextCharset::Utf8),
            Err(DecodeError::UnknownAction { code: 0, .. })
        ));
    }

    #[test]
    fn truncated_text_is_rejected() {
        let parts = vec![DiffPart::FullRevision {
            text: RevisionText::from("some text payload"),
        }];
        let body = encode_parts(&parts, TextCharset::Utf8).unwrap();
        let cut = &body[..body.len() - 4];
        assert!(matches!(
            decode_parts(cut, TextCharset::Utf8),
            Err(DecodeError::Truncated { context: "text", .. })
        ));
    }
}
