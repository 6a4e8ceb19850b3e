// Block matcher: partitions two revisions into matched and unmatched blocks.
//
// 1. Strip the common suffix, then the common prefix of what remains, and
//    record both as matched blocks.
// 2. Index every unit of the previous revision's middle by value.
// 3. Scan the current revision's middle left to right. At each position
//    try every unused candidate with the same unit, extend forward while
//    both sides agree, keep the longest (earliest candidate on ties). A
//    match longer than `min_match` becomes a matched block on both sides
//    and the scan jumps past it; otherwise the scan moves one unit.
// 4. Whatever is left unused becomes unmatched blocks.
//
// Block boundaries never separate the two halves of a surrogate pair.

use std::collections::HashMap;
use std::ops::Range;

use log::trace;

use super::config::MatcherConfig;
use crate::revision::splits_pair;

/// A contiguous range of one revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: usize,
    pub end: usize,
    /// Shared id for blocks present in both revisions; `None` when the
    /// range exists on one side only.
    pub id: Option<usize>,
}

impl Block {
    pub fn matched(range: Range<usize>, id: usize) -> Self {
        Self {
            start: range.start,
            end: range.end,
            id: Some(id),
        }
    }

    pub fn unmatched(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            id: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn is_matched(&self) -> bool {
        self.id.is_some()
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Position-sorted block partitions of both revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLists {
    pub previous: Vec<Block>,
    pub current: Vec<Block>,
    /// Number of matched blocks; ids are `0..matched`.
    pub matched: usize,
}

impl BlockLists {
    fn push_matched(&mut self, previous: Range<usize>, current: Range<usize>) {
        let id = self.matched;
        self.previous.push(Block::matched(previous, id));
        self.current.push(Block::matched(current, id));
        self.matched += 1;
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Partition `previous` and `current` into blocks.
pub fn match_blocks(config: &MatcherConfig, previous: &[u16], current: &[u16]) -> BlockLists {
    let (a, b) = (previous, current);
    let mut lists = BlockLists::default();

    let mut suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    while suffix > 0 && (splits_pair(a, a.len() - suffix) || splits_pair(b, b.len() - suffix)) {
        suffix -= 1;
    }
    let (a_hi, b_hi) = (a.len() - suffix, b.len() - suffix);

    let mut prefix = a[..a_hi]
        .iter()
        .zip(&b[..b_hi])
        .take_while(|(x, y)| x == y)
        .count();
    while prefix > 0 && (splits_pair(a, prefix) || splits_pair(b, prefix)) {
        prefix -= 1;
    }

    if prefix > 0 {
        lists.push_matched(0..prefix, 0..prefix);
    }

    let mut scan = MiddleScan {
        a,
        b,
        a_lo: prefix,
        a_hi,
        b_lo: prefix,
        b_hi,
        used_a: vec![false; a_hi - prefix],
        used_b: vec![false; b_hi - prefix],
    };
    scan.run(config.min_match, &mut lists);

    if suffix > 0 {
        lists.push_matched(a_hi..a.len(), b_hi..b.len());
    }

    push_unmatched(&mut lists.previous, &scan.used_a, scan.a_lo);
    push_unmatched(&mut lists.current, &scan.used_b, scan.b_lo);

    lists.previous.sort_by_key(|blk| blk.start);
    lists.current.sort_by_key(|blk| blk.start);

    trace!(
        "blocks: prefix={prefix} suffix={suffix} matched={} previous={} current={}",
        lists.matched,
        lists.previous.len(),
        lists.current.len()
    );
    lists
}

/// Longest-common-substring scan over the middle sections.
struct MiddleScan<'a> {
    a: &'a [u16],
    b: &'a [u16],
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
    used_a: Vec<bool>,
    used_b: Vec<bool>,
}

impl MiddleScan<'_> {
    fn run(&mut self, min_match: usize, lists: &mut BlockLists) {
        if self.a_lo >= self.a_hi || self.b_lo >= self.b_hi {
            return;
        }

        let mut index: HashMap<u16, Vec<usize>> = HashMap::new();
        for i in self.a_lo..self.a_hi {
            index.entry(self.a[i]).or_default().push(i);
        }

        let mut j = self.b_lo;
        while j < self.b_hi {
            let (pos, len) = match index.get(&self.b[j]) {
                Some(candidates) if !splits_pair(self.b, j) => self.longest_at(j, candidates),
                _ => (0, 0),
            };
            if len > min_match {
                self.used_a[pos - self.a_lo..pos - self.a_lo + len].fill(true);
                self.used_b[j - self.b_lo..j - self.b_lo + len].fill(true);
                lists.push_matched(pos..pos + len, j..j + len);
                j += len;
            } else {
                j += 1;
            }
        }
    }

    /// Longest unused match starting at `j`; earliest candidate wins ties.
    fn longest_at(&self, j: usize, candidates: &[usize]) -> (usize, usize) {
        let (mut best_pos, mut best_len) = (0, 0);
        for &i in candidates {
            if self.used_a[i - self.a_lo] || splits_pair(self.a, i) {
                continue;
            }
            // Only a candidate that also agrees at offset `best_len` can win.
            if best_len > 0 && !self.agrees(i + best_len, j + best_len) {
                continue;
            }
            let len = self.extend(i, j);
            if len > best_len {
                best_pos = i;
                best_len = len;
            }
        }
        (best_pos, best_len)
    }

    #[inline]
    fn agrees(&self, i: usize, j: usize) -> bool {
        i < self.a_hi && j < self.b_hi && !self.used_a[i - self.a_lo] && self.a[i] == self.b[j]
    }

    fn extend(&self, i: usize, j: usize) -> usize {
        let mut len = 0;
        while self.agrees(i + len, j + len) {
            len += 1;
        }
        while len > 0 && (splits_pair(self.a, i + len) || splits_pair(self.b, j + len)) {
            len -= 1;
        }
        len
    }
}

fn push_unmatched(blocks: &mut Vec<Block>, used: &[bool], offset: usize) {
    let mut run_start = None;
    for (k, &is_used) in used.iter().enumerate() {
        match (is_used, run_start) {
            (false, None) => run_start = Some(k),
            (true, Some(s)) => {
                blocks.push(Block::unmatched(offset + s..offset + k));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        blocks.push(Block::unmatched(offset + s..offset + used.len()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn run(min_match: usize, a: &str, b: &str) -> BlockLists {
        match_blocks(&MatcherConfig::new(min_match), &units(a), &units(b))
    }

    fn covers(blocks: &[Block], len: usize) -> bool {
        let mut pos = 0;
        for blk in blocks {
            if blk.start != pos || blk.is_empty() {
                return false;
            }
            pos = blk.end;
        }
        pos == len
    }

    #[test]
    fn identical_texts_are_one_block() {
        let lists = run(12, "Hello World", "Hello World");
        assert_eq!(lists.previous, vec![Block::matched(0..11, 0)]);
        assert_eq!(lists.current, vec![Block::matched(0..11, 0)]);
    }

    #[test]
    fn empty_texts_have_no_blocks() {
        let lists = run(12, "", "");
        assert!(lists.previous.is_empty() && lists.current.is_empty());

        let lists = run(12, "", "new");
        assert!(lists.previous.is_empty());
        assert_eq!(lists.current, vec![Block::unmatched(0..3)]);
    }

    #[test]
    fn suffix_is_stripped_before_prefix() {
        let lists = run(3, "The quick fox", "The quick brown fox");
        assert_eq!(
            lists.previous,
            vec![Block::matched(0..9, 0), Block::matched(9..13, 1)]
        );
        assert_eq!(
            lists.current,
            vec![
                Block::matched(0..9, 0),
                Block::unmatched(9..15),
                Block::matched(15..19, 1)
            ]
        );
    }

    #[test]
    fn swapped_halves_match_as_blocks() {
        let x = "abcdefghijklmnop";
        let y = "0123456789ABCDEFGH";
        let lists = run(12, &format!("{x}{y}"), &format!("{y}{x}"));
        assert_eq!(lists.matched, 2);
        assert!(lists.previous.iter().all(Block::is_matched));
        assert!(lists.current.iter().all(Block::is_matched));
        assert_eq!(lists.current[0].len(), y.len());
        assert_eq!(lists.previous[0].len(), x.len());
    }

    #[test]
    fn short_matches_stay_unmatched() {
        // "common" (6 units) is shared but does not exceed min_match = 7.
        let lists = run(7, "AAcommonBB", "CCcommonDD");
        assert_eq!(lists.matched, 0);
        assert_eq!(lists.previous, vec![Block::unmatched(0..10)]);
    }

    #[test]
    fn earliest_candidate_wins_ties() {
        let text = "0123456789abcdef";
        let a = format!("{text}--{text}");
        let b = format!("##{text}##");
        let lists = run(8, &a, &b);
        let matched: Vec<_> = lists.previous.iter().filter(|b| b.is_matched()).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].start, 0);
    }

    #[test]
    fn partitions_cover_both_texts() {
        let a = "The article starts here. A middle paragraph moves. The end.";
        let b = "The article starts here. The end. A middle paragraph moves!";
        let lists = run(7, a, b);
        assert!(covers(&lists.previous, a.len()));
        assert!(covers(&lists.current, b.len()));
    }

    #[test]
    fn surrogate_pairs_are_never_split() {
        let lists = run(3, "x\u{1F600}y", "x\u{1F601}y");
        assert_eq!(
            lists.previous,
            vec![
                Block::matched(0..1, 0),
                Block::unmatched(1..3),
                Block::matched(3..4, 1)
            ]
        );
        assert_eq!(lists.current[1], Block::unmatched(1..3));
    }
}
