#![no_main]
use libfuzzer_sys::fuzz_target;
use revdelta::codec::{CodecOptions, RevisionCodec, TextCharset};
use revdelta::diff::apply::apply_parts;
use revdelta::revision::RevisionText;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic, only return errors.
    for charset in [TextCharset::Utf8, TextCharset::Utf16Le] {
        let codec = RevisionCodec::new(CodecOptions {
            charset,
            ..Default::default()
        });
        let _ = codec.decode(data);
        let _ = codec.decode_text(&String::from_utf8_lossy(data));
    }

    // Applying whatever decodes must not panic either.
    if data.len() >= 2 {
        let split = data.len() / 2;
        let (base, payload) = data.split_at(split);
        if let Ok((_, parts)) = RevisionCodec::default().decode(payload) {
            let base = RevisionText::from(String::from_utf8_lossy(base).as_ref());
            let _ = apply_parts(&parts, &base);
        }
    }
});
