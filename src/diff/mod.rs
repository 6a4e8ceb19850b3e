// Diff model: edit operations between consecutive revisions.
//
// - `DiffPart`: one operation out of a closed set of six
// - `Diff`: ordered parts plus the revision metadata they belong to
// - `apply`: left-to-right reconstruction of the current text

pub mod apply;

use chrono::{DateTime, Utc};

use crate::codec::header::RevisionCodecData;
use crate::revision::{Contributor, Revision, RevisionText};
use crate::task::ByteSize;

pub use apply::ApplyError;

// ---------------------------------------------------------------------------
// DiffPart
// ---------------------------------------------------------------------------

/// A single edit operation.
///
/// `Delete`, `Replace` and `Cut` address ranges of the previous revision.
/// `Insert` and `Paste` address positions in the text being built.
/// All offsets and lengths count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffPart {
    /// Checkpoint: the complete text of the revision.
    FullRevision { text: RevisionText },
    Insert { start: usize, text: RevisionText },
    Delete { start: usize, length: usize },
    /// Replace `length` units at `start` with `text`.
    Replace {
        start: usize,
        length: usize,
        text: RevisionText,
    },
    /// Remove a block that is pasted elsewhere under `block_id`.
    Cut {
        start: usize,
        length: usize,
        block_id: usize,
    },
    Paste { start: usize, block_id: usize },
}

impl DiffPart {
    pub fn text(&self) -> Option<&RevisionText> {
        match self {
            DiffPart::FullRevision { text }
            | DiffPart::Insert { text, .. }
            | DiffPart::Replace { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_full_revision(&self) -> bool {
        matches!(self, DiffPart::FullRevision { .. })
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Revision metadata stored alongside a diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffMetadata {
    /// 1-based position of the revision among the article's stored diffs.
    pub revision_counter: u64,
    pub revision_id: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub comment: String,
    pub contributor: Option<Contributor>,
    pub minor: bool,
}

impl DiffMetadata {
    pub fn from_revision(revision: &Revision, revision_counter: u64) -> Self {
        Self {
            revision_counter,
            revision_id: revision.revision_id,
            timestamp: Some(revision.timestamp),
            comment: revision.comment.clone(),
            contributor: Some(revision.contributor.clone()),
            minor: revision.minor,
        }
    }
}

/// Ordered edit operations turning one revision into the next.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diff {
    pub parts: Vec<DiffPart>,
    pub meta: DiffMetadata,
    /// Field widths chosen for this diff; filled by the codec.
    pub codec_data: RevisionCodecData,
}

impl Diff {
    pub fn new(parts: Vec<DiffPart>, meta: DiffMetadata) -> Self {
        Self {
            parts,
            meta,
            codec_data: RevisionCodecData::default(),
        }
    }

    /// Checkpoint diff carrying the whole text.
    pub fn full_revision(text: RevisionText, meta: DiffMetadata) -> Self {
        Self::new(vec![DiffPart::FullRevision { text }], meta)
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn is_full_revision(&self) -> bool {
        self.parts.first().is_some_and(DiffPart::is_full_revision)
    }

    /// Reconstruct the current revision from `previous`.
    pub fn apply(&self, previous: &RevisionText) -> Result<RevisionText, ApplyError> {
        apply::apply_parts(&self.parts, previous)
    }
}

impl ByteSize for Diff {
    fn byte_size(&self) -> usize {
        let parts: usize = self
            .parts
            .iter()
            .map(|p| 12 + p.text().map_or(0, |t| t.len() * 2))
            .sum();
        let contributor = self.meta.contributor.as_ref().map_or(0, |c| c.name().len());
        48 + parts + self.meta.comment.len() + contributor
    }
}
