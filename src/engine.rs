// Diff engine: ties block matching to the revision codec.
//
// Provides one-shot APIs that orchestrate:
//   - Block matching and block management to find the diff parts
//   - Revision codec encoding to produce the payload
//   - Payload decoding plus reconstruction of the current revision

use thiserror::Error;

use crate::codec::{CodecOptions, DecodeError, EncodeError, RevisionCodec};
use crate::diff::{ApplyError, DiffPart, apply::apply_parts};
use crate::matching::{self, MatcherConfig};
use crate::revision::RevisionText;

// ---------------------------------------------------------------------------
// Encode options
// ---------------------------------------------------------------------------

/// Configuration for one-shot diff encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub matcher: MatcherConfig,
    pub codec: CodecOptions,
}

// ---------------------------------------------------------------------------
// Diff computation
// ---------------------------------------------------------------------------

/// Diff parts turning `previous` into `current` with the default matcher.
///
/// Identical texts yield no parts.
pub fn compute_diff(previous: &RevisionText, current: &RevisionText) -> Vec<DiffPart> {
    compute_diff_with(previous, current, &MatcherConfig::default())
}

pub fn compute_diff_with(
    previous: &RevisionText,
    current: &RevisionText,
    config: &MatcherConfig,
) -> Vec<DiffPart> {
    matching::diff_units(config, previous.as_units(), current.as_units())
}

// ---------------------------------------------------------------------------
// High-level encode / decode
// ---------------------------------------------------------------------------

/// Encode the diff between `previous` and `current` into `output`.
pub fn encode(
    previous: &RevisionText,
    current: &RevisionText,
    output: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    encode_with_options(previous, current, output, &EncodeOptions::default())
}

/// Encode with custom options.
pub fn encode_with_options(
    previous: &RevisionText,
    current: &RevisionText,
    output: &mut Vec<u8>,
    opts: &EncodeOptions,
) -> Result<(), EncodeError> {
    let parts = compute_diff_with(previous, current, &opts.matcher);
    let payload = RevisionCodec::new(opts.codec).encode_parts(&parts)?;
    output.extend_from_slice(&payload);
    Ok(())
}

/// Decode `payload` and apply it to `previous`.
///
/// The payload's compression marker is detected automatically; `opts.charset`
/// must match the one used for encoding.
pub fn decode(
    previous: &RevisionText,
    payload: &[u8],
    opts: &CodecOptions,
) -> Result<RevisionText, EngineError> {
    let (_, parts) = RevisionCodec::new(*opts).decode(payload)?;
    Ok(apply_parts(&parts, previous)?)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
