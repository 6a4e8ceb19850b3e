// Block manager: turns matched/unmatched block lists into diff parts.
//
// Matched blocks whose relative order is the same in both revisions stay in
// place; the heaviest such order-preserving set (by total length) is chosen
// so that the fewest units move. Every other matched block is moved with a
// Cut at its previous position and a Paste at its current position.
//
// The emission walk advances through both lists in parallel. Removals on
// the previous side are always emitted before additions on the current
// side, which keeps Delete/Replace/Cut starts ascending in previous
// coordinates and Insert/Paste starts ascending in current coordinates.

use log::trace;

use super::blocks::{Block, BlockLists};
use crate::diff::DiffPart;
use crate::revision::RevisionText;

/// Diff parts that rebuild `current` from the revision `lists.previous` was
/// computed against.
pub fn manage_blocks(lists: &BlockLists, current: &[u16]) -> Vec<DiffPart> {
    let stationary = stationary_blocks(lists);
    let stays = |blk: &Block| blk.id.is_some_and(|id| stationary[id]);
    let text_of = |blk: &Block| RevisionText::from_slice(&current[blk.range()]);

    let (prev, cur) = (&lists.previous, &lists.current);
    let mut parts = Vec::new();
    let (mut ia, mut ib) = (0, 0);

    loop {
        match (prev.get(ia), cur.get(ib)) {
            (None, None) => break,
            (Some(a), next) if !stays(a) => {
                match (a.id, next) {
                    (None, Some(b)) if b.id.is_none() => {
                        parts.push(DiffPart::Replace {
                            start: a.start,
                            length: a.len(),
                            text: text_of(b),
                        });
                        ib += 1;
                    }
                    (None, _) => parts.push(DiffPart::Delete {
                        start: a.start,
                        length: a.len(),
                    }),
                    (Some(id), _) => parts.push(DiffPart::Cut {
                        start: a.start,
                        length: a.len(),
                        block_id: id,
                    }),
                }
                ia += 1;
            }
            (_, Some(b)) if !stays(b) => {
                parts.push(match b.id {
                    None => DiffPart::Insert {
                        start: b.start,
                        text: text_of(b),
                    },
                    Some(id) => DiffPart::Paste {
                        start: b.start,
                        block_id: id,
                    },
                });
                ib += 1;
            }
            // Both heads are the same stationary block.
            (Some(_), Some(_)) => {
                ia += 1;
                ib += 1;
            }
            (Some(_), None) => ia += 1,
            (None, Some(_)) => ib += 1,
        }
    }

    trace!(
        "manager: {} parts from {} matched blocks",
        parts.len(),
        lists.matched
    );
    parts
}

/// Flags, indexed by block id, for the matched blocks that stay in place.
///
/// Heaviest increasing subsequence over the matched blocks in current
/// order, keyed by their rank in previous order. A Fenwick tree of
/// prefix maxima keeps this `O(k log k)`; ties go to the earlier
/// predecessor so results are deterministic.
fn stationary_blocks(lists: &BlockLists) -> Vec<bool> {
    let k = lists.matched;
    let mut rank = vec![0usize; k];
    for (r, id) in lists.previous.iter().filter_map(|b| b.id).enumerate() {
        rank[id] = r;
    }

    let seq: Vec<(usize, usize)> = lists
        .current
        .iter()
        .filter_map(|b| b.id.map(|id| (id, b.len())))
        .collect();

    let mut tree = MaxTree::new(k);
    let mut weight = vec![0usize; seq.len()];
    let mut back = vec![None; seq.len()];
    let mut best: Option<Best> = None;

    for (pos, &(id, len)) in seq.iter().enumerate() {
        let pred = tree.query(rank[id]);
        weight[pos] = len + pred.map_or(0, |p| p.weight);
        back[pos] = pred.map(|p| p.pos);
        let here = Best {
            weight: weight[pos],
            pos,
        };
        tree.update(rank[id], here);
        if best.is_none_or(|b| here.beats(&b)) {
            best = Some(here);
        }
    }

    let mut stationary = vec![false; k];
    let mut cursor = best.map(|b| b.pos);
    while let Some(pos) = cursor {
        stationary[seq[pos].0] = true;
        cursor = back[pos];
    }
    stationary
}

#[derive(Debug, Clone, Copy)]
struct Best {
    weight: usize,
    pos: usize,
}

impl Best {
    fn beats(&self, other: &Best) -> bool {
        self.weight > other.weight || (self.weight == other.weight && self.pos < other.pos)
    }
}

/// Prefix-maximum Fenwick tree over previous-order ranks.
struct MaxTree {
    nodes: Vec<Option<Best>>,
}

impl MaxTree {
    fn new(len: usize) -> Self {
        Self {
            nodes: vec![None; len + 1],
        }
    }

    /// Best entry among ranks strictly below `rank`.
    fn query(&self, rank: usize) -> Option<Best> {
        let mut i = rank;
        let mut best: Option<Best> = None;
        while i > 0 {
            if let Some(node) = self.nodes[i]
                && best.is_none_or(|b| node.beats(&b))
            {
                best = Some(node);
            }
            i &= i - 1;
        }
        best
    }

    fn update(&mut self, rank: usize, value: Best) {
        let mut i = rank + 1;
        while i < self.nodes.len() {
            let slot = &mut self.nodes[i];
            if slot.is_none_or(|b| value.beats(&b)) {
                *slot = Some(value);
            }
            i += i & i.wrapping_neg();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
