//! Revdelta: compact binary deltas between consecutive article revisions.
//!
//! The crate provides:
//! - Block matching and move detection over UTF-16 text (`matching`)
//! - The diff model and its application (`diff`)
//! - The bit-packed revision codec with deflate/base64 framing (`codec`)
//! - One-shot encode/decode helpers (`engine`)
//! - The per-article diff driver with checkpoints and verification (`driver`)
//! - Bounded multi-threaded task pipelines (`pipeline`)
//! - Reconstruction of stored revisions (`replay`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use revdelta::codec::CodecOptions;
//! use revdelta::engine;
//! use revdelta::revision::RevisionText;
//!
//! let previous = RevisionText::from("The quick fox jumps over the lazy dog.");
//! let current = RevisionText::from("The quick brown fox jumps over the lazy dog.");
//!
//! let mut payload = Vec::new();
//! engine::encode(&previous, &current, &mut payload).unwrap();
//! let rebuilt = engine::decode(&previous, &payload, &CodecOptions::default()).unwrap();
//! assert_eq!(rebuilt, current);
//! ```

pub mod codec;
pub mod config;
pub mod diff;
pub mod driver;
pub mod engine;
pub mod matching;
pub mod pipeline;
pub mod replay;
pub mod revision;
pub mod task;

#[cfg(feature = "cli")]
pub mod cli;
