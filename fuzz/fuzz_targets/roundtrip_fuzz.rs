#![no_main]
use libfuzzer_sys::fuzz_target;
use revdelta::codec::{CodecOptions, RevisionCodec, TextCharset};
use revdelta::diff::apply::apply_parts;
use revdelta::matching::{MatcherConfig, diff_units};
use revdelta::revision::RevisionText;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte: min match and compression flag.
    let flags = data[0];
    let min_match = 1 + (flags & 0x1f) as usize;
    let compress = flags & 0x80 != 0;

    // Remaining bytes as UTF-16 units split into previous and current.
    let units: Vec<u16> = data[1..]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let split = units.len() / 2;
    let previous = RevisionText::from_slice(&units[..split]);
    let current = RevisionText::from_slice(&units[split..]);

    let parts = diff_units(
        &MatcherConfig::new(min_match),
        previous.as_units(),
        current.as_units(),
    );
    assert_eq!(apply_parts(&parts, &previous).unwrap(), current);

    let codec = RevisionCodec::new(CodecOptions {
        charset: TextCharset::Utf16Le,
        compress,
        level: 6,
    });
    let payload = codec.encode_parts(&parts).unwrap();
    let (_, decoded) = codec.decode(&payload).unwrap();
    assert_eq!(decoded, parts);
});
