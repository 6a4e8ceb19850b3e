// Outer payload framing around the bit-packed body.
//
// Binary:  [0x80 deflate(body)] | [body]
// Text:    ['_' base64(deflate(body))] | [base64(body)]
//
// A body always starts with the 3-bit codec marker (zero), so its first
// byte is below 0x20 and can never collide with the compression marker.
// Compression follows the same "only when worth it" rule as a secondary
// compressor: bodies under `MIN_COMPRESS_SIZE` or that do not shrink are
// stored as-is.

use std::borrow::Cow;
use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use super::decoder::{self, DecodeError};
use super::encoder::{self, EncodeError};
use super::header::RevisionCodecData;
use super::text::TextCharset;
use crate::diff::{Diff, DiffPart};

/// Leading byte of a deflate-compressed binary payload.
pub const COMPRESSED_MARKER: u8 = 0x80;

/// Leading character of a deflate-compressed text payload.
pub const COMPRESSED_TEXT_MARKER: char = '_';

/// Minimum body size worth compressing.
pub const MIN_COMPRESS_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    pub charset: TextCharset,
    /// Deflate the body when it gets smaller.
    pub compress: bool,
    /// Deflate level (0-9).
    pub level: u32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            charset: TextCharset::Utf8,
            compress: false,
            level: 6,
        }
    }
}

// ---------------------------------------------------------------------------
// Framing helpers
// ---------------------------------------------------------------------------

fn deflate(body: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut enc = DeflateEncoder::new(Vec::with_capacity(body.len() / 2), Compression::new(level));
    enc.write_all(body)?;
    enc.finish()
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len() * 3);
    DeflateDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Inflate(e.to_string()))?;
    Ok(out)
}

/// Deflated body when compression applies and pays off.
fn maybe_deflate(body: &[u8], opts: &CodecOptions) -> Result<Option<Vec<u8>>, EncodeError> {
    if !opts.compress || body.len() < MIN_COMPRESS_SIZE {
        return Ok(None);
    }
    let packed = deflate(body, opts.level)?;
    Ok((packed.len() + 1 < body.len()).then_some(packed))
}

/// Wrap a body into a binary payload.
pub fn frame(body: Vec<u8>, opts: &CodecOptions) -> Result<Vec<u8>, EncodeError> {
    match maybe_deflate(&body, opts)? {
        Some(packed) => {
            let mut out = Vec::with_capacity(packed.len() + 1);
            out.push(COMPRESSED_MARKER);
            out.extend_from_slice(&packed);
            Ok(out)
        }
        None => Ok(body),
    }
}

/// Strip the binary framing, inflating when marked.
pub fn unframe(payload: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
    match payload.split_first() {
        None => Err(DecodeError::Empty),
        Some((&COMPRESSED_MARKER, rest)) => inflate(rest).map(Cow::Owned),
        Some(_) => Ok(Cow::Borrowed(payload)),
    }
}

/// Wrap a body into a text payload.
pub fn frame_text(body: &[u8], opts: &CodecOptions) -> Result<String, EncodeError> {
    Ok(match maybe_deflate(body, opts)? {
        Some(packed) => {
            let mut out = String::with_capacity(packed.len() * 4 / 3 + 4);
            out.push(COMPRESSED_TEXT_MARKER);
            STANDARD.encode_string(&packed, &mut out);
            out
        }
        None => STANDARD.encode(body),
    })
}

/// Strip the text framing and return the body bytes.
pub fn unframe_text(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    match payload.strip_prefix(COMPRESSED_TEXT_MARKER) {
        Some(rest) => inflate(&STANDARD.decode(rest)?),
        None => Ok(STANDARD.decode(payload)?),
    }
}

// ---------------------------------------------------------------------------
// RevisionCodec
// ---------------------------------------------------------------------------

/// Serializes diffs to framed payloads and back.
///
/// # Example
/// ```
/// use revdelta::codec::{CodecOptions, RevisionCodec};
/// use revdelta::diff::{Diff, DiffMetadata, DiffPart};
///
/// let codec = RevisionCodec::new(CodecOptions::default());
/// let diff = Diff::new(
///     vec![DiffPart::Delete { start: 3, length: 2 }],
///     DiffMetadata::default(),
/// );
/// let bytes = codec.encode(&diff).unwrap();
/// let (_, parts) = codec.decode(&bytes).unwrap();
/// assert_eq!(parts, diff.parts);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionCodec {
    opts: CodecOptions,
}

impl RevisionCodec {
    pub fn new(opts: CodecOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.opts
    }

    /// Field widths `diff` would be encoded with.
    pub fn codec_data(&self, parts: &[DiffPart]) -> Result<RevisionCodecData, EncodeError> {
        encoder::codec_data(parts, self.opts.charset)
    }

    /// Bit-packed body without framing.
    pub fn encode_body(&self, parts: &[DiffPart]) -> Result<Vec<u8>, EncodeError> {
        encoder::encode_parts(parts, self.opts.charset)
    }

    pub fn decode_body(
        &self,
        body: &[u8],
    ) -> Result<(RevisionCodecData, Vec<DiffPart>), DecodeError> {
        decoder::decode_parts(body, self.opts.charset)
    }

    /// Binary payload for `diff`.
    pub fn encode(&self, diff: &Diff) -> Result<Vec<u8>, EncodeError> {
        self.encode_parts(&diff.parts)
    }

    pub fn encode_parts(&self, parts: &[DiffPart]) -> Result<Vec<u8>, EncodeError> {
        frame(self.encode_body(parts)?, &self.opts)
    }

    /// Decode a binary payload; compression is detected from the marker.
    pub fn decode(&self, payload: &[u8]) -> Result<(RevisionCodecData, Vec<DiffPart>), DecodeError> {
        self.decode_body(&unframe(payload)?)
    }

    /// Base64 text payload for `diff`.
    pub fn encode_text(&self, diff: &Diff) -> Result<String, EncodeError> {
        frame_text(&self.encode_body(&diff.parts)?, &self.opts)
    }

    pub fn decode_text(
        &self,
        payload: &str,
    ) -> Result<(RevisionCodecData, Vec<DiffPart>), DecodeError> {
        self.decode_body(&unframe_text(payload)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
