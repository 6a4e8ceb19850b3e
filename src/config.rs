// Pipeline configuration.
//
// Read-only for the driver once validated; every problem is reported by
// `validate()` before any revision is processed.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecOptions;
pub use crate::codec::TextCharset;
use crate::matching::{DEFAULT_MIN_MATCH, MIN_MATCH_FLOOR, MatcherConfig};

pub const DEFAULT_FULL_REVISION_INTERVAL: u64 = 1000;
pub const DEFAULT_INPUT_TASK_LIMIT: usize = 8 << 20; // 8 MiB
pub const DEFAULT_OUTPUT_TASK_LIMIT: usize = 4 << 20; // 4 MiB
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("minimum match length {0} is below the floor of {MIN_MATCH_FLOOR}")]
    MinMatchTooSmall(usize),
    #[error("full revision interval must be at least 1")]
    ZeroFullRevisionInterval,
    #[error("{0} task limit must be non-zero")]
    ZeroTaskLimit(&'static str),
    #[error("queue capacity must be non-zero")]
    ZeroQueueCapacity,
    #[error("queue timeout must be non-zero")]
    ZeroQueueTimeout,
    #[error("compression level {0} out of range (0-9)")]
    CompressionLevel(u32),
    #[error("unknown surrogate mode '{0}' (expected discard or replace)")]
    UnknownSurrogateMode(String),
}

// ---------------------------------------------------------------------------
// Surrogate handling
// ---------------------------------------------------------------------------

/// What the driver does with a revision holding an unpaired surrogate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SurrogateMode {
    /// Drop the revision; the previous text stays the diff base.
    #[default]
    DiscardRevision,
    /// Replace every unpaired surrogate with U+FFFD and diff the result.
    ReplaceSurrogates,
}

impl SurrogateMode {
    pub fn name(self) -> &'static str {
        match self {
            SurrogateMode::DiscardRevision => "discard",
            SurrogateMode::ReplaceSurrogates => "replace",
        }
    }
}

impl fmt::Display for SurrogateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SurrogateMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discard" | "discard-revision" => Ok(SurrogateMode::DiscardRevision),
            "replace" | "replace-surrogates" => Ok(SurrogateMode::ReplaceSurrogates),
            _ => Err(ConfigError::UnknownSurrogateMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// DiffConfig
// ---------------------------------------------------------------------------

/// Driver and pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffConfig {
    /// Matched blocks must be longer than this many code units.
    pub min_match: usize,
    /// Every Nth revision of an article is stored as a full revision.
    pub full_revision_interval: u64,
    /// Byte budget of revision tasks produced by a reader.
    pub input_task_limit: usize,
    /// Byte budget of diff tasks produced by the driver.
    pub output_task_limit: usize,
    pub charset: TextCharset,
    pub surrogate_mode: SurrogateMode,
    /// Apply every diff and compare against the real revision.
    pub verify: bool,
    /// Deflate encoded payloads when it saves space.
    pub compress: bool,
    pub compression_level: u32,
    /// Where to write the failing task when verification fails.
    pub debug_dump_dir: Option<PathBuf>,
    pub queue_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            min_match: DEFAULT_MIN_MATCH,
            full_revision_interval: DEFAULT_FULL_REVISION_INTERVAL,
            input_task_limit: DEFAULT_INPUT_TASK_LIMIT,
            output_task_limit: DEFAULT_OUTPUT_TASK_LIMIT,
            charset: TextCharset::Utf8,
            surrogate_mode: SurrogateMode::DiscardRevision,
            verify: true,
            compress: false,
            compression_level: 6,
            debug_dump_dir: None,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DiffConfig {
    /// Check every setting; the first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_match < MIN_MATCH_FLOOR {
            return Err(ConfigError::MinMatchTooSmall(self.min_match));
        }
        if self.full_revision_interval == 0 {
            return Err(ConfigError::ZeroFullRevisionInterval);
        }
        if self.input_task_limit == 0 {
            return Err(ConfigError::ZeroTaskLimit("input"));
        }
        if self.output_task_limit == 0 {
            return Err(ConfigError::ZeroTaskLimit("output"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.queue_timeout.is_zero() {
            return Err(ConfigError::ZeroQueueTimeout);
        }
        if self.compression_level > 9 {
            return Err(ConfigError::CompressionLevel(self.compression_level));
        }
        Ok(())
    }

    pub fn matcher(&self) -> MatcherConfig {
        MatcherConfig::new(self.min_match)
    }

    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            charset: self.charset,
            compress: self.compress,
            level: self.compression_level,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
