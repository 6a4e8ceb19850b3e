// Revision records as read from an article history.
//
// Text is held as UTF-16 code units: offsets in diffs count code units, and
// an unpaired surrogate from the source dump survives until the driver's
// surrogate policy decides what to do with it.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::task::ByteSize;

// ---------------------------------------------------------------------------
// Surrogate helpers
// ---------------------------------------------------------------------------

#[inline]
pub(crate) fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

#[inline]
pub(crate) fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// True when a boundary at `index` would separate a high surrogate from
/// the low surrogate that completes it.
#[inline]
pub(crate) fn splits_pair(units: &[u16], index: usize) -> bool {
    index > 0
        && index < units.len()
        && is_high_surrogate(units[index - 1])
        && is_low_surrogate(units[index])
}

// ---------------------------------------------------------------------------
// RevisionText
// ---------------------------------------------------------------------------

/// Revision text as a sequence of UTF-16 code units.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RevisionText(Vec<u16>);

impl RevisionText {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_units(units: Vec<u16>) -> Self {
        Self(units)
    }

    pub fn from_slice(units: &[u16]) -> Self {
        Self(units.to_vec())
    }

    #[inline]
    pub fn as_units(&self) -> &[u16] {
        &self.0
    }

    pub fn into_units(self) -> Vec<u16> {
        self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> RevisionText {
        Self(self.0[range].to_vec())
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }

    pub fn has_unpaired_surrogates(&self) -> bool {
        char::decode_utf16(self.0.iter().copied()).any(|c| c.is_err())
    }

    /// Copy with every unpaired surrogate replaced by U+FFFD.
    pub fn replace_unpaired_surrogates(&self) -> RevisionText {
        let sanitized: String = char::decode_utf16(self.0.iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        Self::from(sanitized.as_str())
    }

    /// Units with `\r\n` and lone `\r` folded to `\n`. Used only to compare
    /// reconstructions; stored text is never normalized.
    pub fn normalized_line_endings(&self) -> Vec<u16> {
        const CR: u16 = b'\r' as u16;
        const LF: u16 = b'\n' as u16;

        let mut out = Vec::with_capacity(self.0.len());
        let mut iter = self.0.iter().copied().peekable();
        while let Some(unit) = iter.next() {
            if unit == CR {
                if iter.peek() == Some(&LF) {
                    iter.next();
                }
                out.push(LF);
            } else {
                out.push(unit);
            }
        }
        out
    }
}

impl From<&str> for RevisionText {
    fn from(s: &str) -> Self {
        Self(s.encode_utf16().collect())
    }
}

impl From<String> for RevisionText {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Vec<u16>> for RevisionText {
    fn from(units: Vec<u16>) -> Self {
        Self(units)
    }
}

impl fmt::Debug for RevisionText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

impl fmt::Display for RevisionText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// Who made an edit. Registered users and anonymous addresses are exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contributor {
    Registered { id: Option<u64>, name: String },
    Anonymous { address: String },
}

impl Contributor {
    pub fn is_registered(&self) -> bool {
        matches!(self, Contributor::Registered { .. })
    }

    /// Username or network address.
    pub fn name(&self) -> &str {
        match self {
            Contributor::Registered { name, .. } => name,
            Contributor::Anonymous { address } => address,
        }
    }
}

/// One historical version of an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Position of the revision within its article, as read from the dump.
    pub sequence: u64,
    pub revision_id: u64,
    pub timestamp: DateTime<Utc>,
    pub text: RevisionText,
    pub comment: String,
    pub contributor: Contributor,
    pub minor: bool,
}

impl Revision {
    /// Revision with empty metadata, mostly for tests and the CLI.
    pub fn new(
        sequence: u64,
        revision_id: u64,
        timestamp: DateTime<Utc>,
        text: impl Into<RevisionText>,
    ) -> Self {
        Self {
            sequence,
            revision_id,
            timestamp,
            text: text.into(),
            comment: String::new(),
            contributor: Contributor::Anonymous {
                address: String::new(),
            },
            minor: false,
        }
    }
}

impl ByteSize for Revision {
    fn byte_size(&self) -> usize {
        // Fixed fields: sequence, id, timestamp, flags.
        32 + self.text.len() * 2 + self.comment.len() + self.contributor.name().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
