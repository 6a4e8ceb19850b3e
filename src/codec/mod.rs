// Revision diff codec.
//
// # Modules
//
// - `bits`: MSB-first bit reader/writer with explicit end-of-stream
// - `action`: 3-bit action codes
// - `header`: per-diff field widths (`RevisionCodecData`)
// - `text`: text payload charsets
// - `encoder`: diff parts -> bit-packed body
// - `decoder`: bit-packed body -> diff parts
// - `payload`: deflate marker and base64 transport around the body

pub mod action;
pub mod bits;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod payload;
pub mod text;

pub use action::Action;
pub use bits::{BitError, BitReader, BitWriter};
pub use decoder::DecodeError;
pub use encoder::EncodeError;
pub use header::{Field, RevisionCodecData};
pub use payload::{CodecOptions, RevisionCodec};
pub use text::TextCharset;
