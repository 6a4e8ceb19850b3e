// Diff application: rebuilds the current revision from the previous one.
//
// The previous text is consumed by a single forward cursor. Source-side
// operations (delete, replace, cut) first copy everything up to their start,
// then skip their range. Target-side operations (insert, paste) first copy
// until the output reaches their position, then append. Cut ranges are
// captured up front because a block can be pasted before the cut that
// removes it from its old place.

use std::collections::HashMap;

use thiserror::Error;

use super::DiffPart;
use crate::revision::RevisionText;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("range {start}+{length} exceeds previous text of {text_len} units")]
    OutOfBounds {
        start: usize,
        length: usize,
        text_len: usize,
    },
    #[error("source offset {start} lies behind cursor {cursor}")]
    SourceBehindCursor { start: usize, cursor: usize },
    #[error("target offset {start} lies behind output length {output_len}")]
    TargetBehindOutput { start: usize, output_len: usize },
    #[error("paste references unknown block {0}")]
    UnknownBlock(usize),
    #[error("block {0} is cut more than once")]
    DuplicateBlock(usize),
}

/// Apply `parts` to `previous`.
pub fn apply_parts(
    parts: &[DiffPart],
    previous: &RevisionText,
) -> Result<RevisionText, ApplyError> {
    let prev = previous.as_units();
    let clipboard = collect_cuts(parts, prev)?;

    let mut rebuild = Rebuild {
        prev,
        cursor: 0,
        out: Vec::with_capacity(prev.len()),
    };

    for part in parts {
        match part {
            DiffPart::FullRevision { text } => {
                rebuild.out.clear();
                rebuild.out.extend_from_slice(text.as_units());
                rebuild.cursor = prev.len();
            }
            DiffPart::Insert { start, text } => {
                rebuild.fill_to(*start)?;
                rebuild.out.extend_from_slice(text.as_units());
            }
            DiffPart::Delete { start, length } | DiffPart::Cut { start, length, .. } => {
                rebuild.skip(*start, *length)?;
            }
            DiffPart::Replace {
                start,
                length,
                text,
            } => {
                rebuild.skip(*start, *length)?;
                rebuild.out.extend_from_slice(text.as_units());
            }
            DiffPart::Paste { start, block_id } => {
                let block = clipboard
                    .get(block_id)
                    .ok_or(ApplyError::UnknownBlock(*block_id))?;
                rebuild.fill_to(*start)?;
                rebuild.out.extend_from_slice(block);
            }
        }
    }

    let Rebuild {
        prev,
        cursor,
        mut out,
    } = rebuild;
    out.extend_from_slice(&prev[cursor..]);
    Ok(RevisionText::from_units(out))
}

fn collect_cuts<'a>(
    parts: &[DiffPart],
    prev: &'a [u16],
) -> Result<HashMap<usize, &'a [u16]>, ApplyError> {
    let mut clipboard = HashMap::new();
    for part in parts {
        if let DiffPart::Cut {
            start,
            length,
            block_id,
        } = *part
        {
            let range = checked_range(start, length, prev.len())?;
            if clipboard.insert(block_id, &prev[range]).is_some() {
                return Err(ApplyError::DuplicateBlock(block_id));
            }
        }
    }
    Ok(clipboard)
}

fn checked_range(
    start: usize,
    length: usize,
    text_len: usize,
) -> Result<std::ops::Range<usize>, ApplyError> {
    match start.checked_add(length) {
        Some(end) if end <= text_len => Ok(start..end),
        _ => Err(ApplyError::OutOfBounds {
            start,
            length,
            text_len,
        }),
    }
}

struct Rebuild<'a> {
    prev: &'a [u16],
    cursor: usize,
    out: Vec<u16>,
}

impl Rebuild<'_> {
    /// Copy previous text up to `start`, then step over `length` units.
    fn skip(&mut self, start: usize, length: usize) -> Result<(), ApplyError> {
        let range = checked_range(start, length, self.prev.len())?;
        if start < self.cursor {
            return Err(ApplyError::SourceBehindCursor {
                start,
                cursor: self.cursor,
            });
        }
        self.out.extend_from_slice(&self.prev[self.cursor..start]);
        self.cursor = range.end;
        Ok(())
    }

    /// Copy previous text until the output is `target` units long.
    fn fill_to(&mut self, target: usize) -> Result<(), ApplyError> {
        let Some(need) = target.checked_sub(self.out.len()) else {
            return Err(ApplyError::TargetBehindOutput {
                start: target,
                output_len: self.out.len(),
            });
        };
        let range = checked_range(self.cursor, need, self.prev.len())?;
        self.out.extend_from_slice(&self.prev[range.clone()]);
        self.cursor = range.end;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
