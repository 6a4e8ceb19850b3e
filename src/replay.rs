// Reconstruction of stored revisions.
//
// Diffs of one article are stored keyed by revision counter. Any revision
// is rebuilt by starting at the nearest full revision at or before it and
// applying the following diffs in counter order, so the replay cost is
// bounded by the full revision interval.

use std::ops::Range;

use thiserror::Error;

use crate::diff::{ApplyError, Diff};
use crate::revision::RevisionText;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("no full revision at or before counter {0}")]
    MissingCheckpoint(u64),
    #[error("revision counter gap: expected {expected}, found {found}")]
    Gap { expected: u64, found: u64 },
    #[error("revision counter {0} not found")]
    NotFound(u64),
    #[error("revision counter {counter}: {source}")]
    Apply {
        counter: u64,
        #[source]
        source: ApplyError,
    },
}

/// Applies one article's diffs in counter order.
#[derive(Debug, Default, Clone)]
pub struct Replayer {
    current: Option<RevisionText>,
    counter: u64,
}

impl Replayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text after the last applied diff.
    pub fn current(&self) -> Option<&RevisionText> {
        self.current.as_ref()
    }

    /// Counter of the last applied diff (0 before the first).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Apply the next diff.
    ///
    /// The first diff must be a full revision; after that counters must be
    /// consecutive. A full revision is accepted at any later point too.
    pub fn push(&mut self, diff: &Diff) -> Result<&RevisionText, ReplayError> {
        let counter = diff.meta.revision_counter;
        let applied = match &self.current {
            None if !diff.is_full_revision() => {
                return Err(ReplayError::MissingCheckpoint(counter));
            }
            None => diff.apply(&RevisionText::new()),
            Some(_) if counter != self.counter + 1 => {
                return Err(ReplayError::Gap {
                    expected: self.counter + 1,
                    found: counter,
                });
            }
            Some(base) => diff.apply(base),
        };
        let text = applied.map_err(|source| ReplayError::Apply { counter, source })?;
        self.counter = counter;
        Ok(self.current.insert(text))
    }
}

/// Index range of `diffs` needed to rebuild `counter`.
///
/// `diffs` must be sorted by revision counter.
pub fn replay_range(diffs: &[Diff], counter: u64) -> Result<Range<usize>, ReplayError> {
    let end = diffs
        .binary_search_by_key(&counter, |d| d.meta.revision_counter)
        .map_err(|_| ReplayError::NotFound(counter))?;
    let start = diffs[..=end]
        .iter()
        .rposition(Diff::is_full_revision)
        .ok_or(ReplayError::MissingCheckpoint(counter))?;
    Ok(start..end + 1)
}

/// Rebuild the revision stored under `counter`.
pub fn reconstruct(diffs: &[Diff], counter: u64) -> Result<RevisionText, ReplayError> {
    let range = replay_range(diffs, counter)?;
    let mut replayer = Replayer::new();
    for diff in &diffs[range] {
        replayer.push(diff)?;
    }
    replayer
        .current
        .ok_or(ReplayError::MissingCheckpoint(counter))
}

/// Rebuild every stored revision in order.
pub fn reconstruct_all(diffs: &[Diff]) -> Result<Vec<RevisionText>, ReplayError> {
    let mut replayer = Replayer::new();
    diffs
        .iter()
        .map(|diff| replayer.push(diff).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffMetadata, DiffPart};

    fn meta(counter: u64) -> DiffMetadata {
        DiffMetadata {
            revision_counter: counter,
            ..Default::default()
        }
    }

    fn history() -> Vec<Diff> {
        vec![
            Diff::full_revision("alpha".into(), meta(1)),
            Diff::new(
                vec![DiffPart::Insert {
                    start: 5,
                    text: " beta".into(),
                }],
                meta(2),
            ),
            Diff::full_revision("gamma".into(), meta(3)),
            Diff::new(
                vec![DiffPart::Replace {
                    start: 0,
                    length: 1,
                    text: "G".into(),
                }],
                meta(4),
            ),
        ]
    }

    #[test]
    fn reconstructs_from_nearest_checkpoint() {
        let diffs = history();
        assert_eq!(reconstruct(&diffs, 2).unwrap(), RevisionText::from("alpha beta"));
        assert_eq!(reconstruct(&diffs, 4).unwrap(), RevisionText::from("Gamma"));
        assert_eq!(replay_range(&diffs, 4).unwrap(), 2..4);
        assert_eq!(replay_range(&diffs, 3).unwrap(), 2..3);
    }

    #[test]
    fn reconstructs_everything_in_order() {
        let texts = reconstruct_all(&history()).unwrap();
        let texts: Vec<String> = texts.iter().map(RevisionText::to_string_lossy).collect();
        assert_eq!(texts, vec!["alpha", "alpha beta", "gamma", "Gamma"]);
    }

    #[test]
    fn replay_needs_a_checkpoint_first() {
        let diffs = history();
        let mut replayer = Replayer::new();
        assert_eq!(
            replayer.push(&diffs[1]),
            Err(ReplayError::MissingCheckpoint(2))
        );
        assert_eq!(
            reconstruct(&diffs[1..2], 2),
            Err(ReplayError::MissingCheckpoint(2))
        );
    }

    #[test]
    fn gaps_and_unknown_counters_are_errors() {
        let diffs = history();
        let mut replayer = Replayer::new();
        replayer.push(&diffs[0]).unwrap();
        assert_eq!(
            replayer.push(&diffs[3]),
            Err(ReplayError::Gap {
                expected: 2,
                found: 4
            })
        );
        assert_eq!(reconstruct(&diffs, 9), Err(ReplayError::NotFound(9)));
    }

    #[test]
    fn apply_failures_carry_the_counter() {
        let diffs = vec![
            Diff::full_revision("abc".into(), meta(1)),
            Diff::new(
                vec![DiffPart::Delete {
                    start: 2,
                    length: 5,
                }],
                meta(2),
            ),
        ];
        assert!(matches!(
            reconstruct(&diffs, 2),
            Err(ReplayError::Apply { counter: 2, .. })
        ));
    }
}
