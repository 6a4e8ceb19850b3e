// Block matcher tuning.

/// Recommended minimum match length for article text.
pub const DEFAULT_MIN_MATCH: usize = 12;

/// Lowest minimum match length a pipeline configuration accepts.
pub const MIN_MATCH_FLOOR: usize = 7;

/// Block matcher configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// A common substring becomes a matched block only when it is longer
    /// than this many code units. Common prefix and suffix are exempt.
    pub min_match: usize,
}

impl MatcherConfig {
    pub fn new(min_match: usize) -> Self {
        Self {
            min_match: min_match.max(1),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_MATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_recommended_length() {
        assert_eq!(MatcherConfig::default().min_match, DEFAULT_MIN_MATCH);
        assert!(DEFAULT_MIN_MATCH >= MIN_MATCH_FLOOR);
    }

    #[test]
    fn zero_is_clamped() {
        assert_eq!(MatcherConfig::new(0).min_match, 1);
    }
}
