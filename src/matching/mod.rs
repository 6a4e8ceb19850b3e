// Block matching for revision diffs.
//
// This module provides:
// - Matcher configuration (minimum match length)
// - The block matcher: prefix/suffix stripping and longest-match scan
// - The block manager: move detection and diff part emission

pub mod blocks;
pub mod config;
pub mod manager;

pub use blocks::{Block, BlockLists, match_blocks};
pub use config::{DEFAULT_MIN_MATCH, MIN_MATCH_FLOOR, MatcherConfig};
pub use manager::manage_blocks;

use crate::diff::DiffPart;

/// Match `previous` against `current` and emit the parts that rebuild
/// `current`. Identical texts produce no parts.
pub fn diff_units(config: &MatcherConfig, previous: &[u16], current: &[u16]) -> Vec<DiffPart> {
    let lists = match_blocks(config, previous, current);
    manage_blocks(&lists, current)
}
