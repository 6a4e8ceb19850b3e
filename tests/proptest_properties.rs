use proptest::prelude::*;
use revdelta::codec::header::bits_for;
use revdelta::codec::{CodecOptions, RevisionCodec, TextCharset};
use revdelta::diff::DiffPart;
use revdelta::diff::apply::apply_parts;
use revdelta::engine;
use revdelta::matching::{MatcherConfig, diff_units};
use revdelta::revision::RevisionText;

/// Wiki-ish text with enough repetition for matches to appear.
fn article_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            Just("The quick brown fox. "),
            Just("Jumps over the lazy dog.\n"),
            Just("== History ==\n"),
            Just("[[Link|label]] "),
            Just("x"),
            Just("\u{00e9}t\u{00e9} "),
            Just("\u{1F600}"),
        ],
        0..60,
    )
    .prop_map(|pieces| pieces.concat())
}

fn units(max: usize) -> impl Strategy<Value = Vec<u16>> {
    proptest::collection::vec(
        prop_oneof![
            4 => 0x61u16..0x65,
            1 => Just(0x20u16),
            1 => 0xD800u16..0xE000,
        ],
        0..max,
    )
}

proptest! {
    #[test]
    fn prop_diff_applies_back_to_current(
        previous in article_text(),
        current in article_text(),
        min_match in 1usize..16
    ) {
        let previous = RevisionText::from(previous.as_str());
        let current = RevisionText::from(current.as_str());
        let parts = diff_units(&MatcherConfig::new(min_match), previous.as_units(), current.as_units());
        prop_assert_eq!(apply_parts(&parts, &previous).unwrap(), current);
    }

    #[test]
    fn prop_payload_roundtrip(
        previous in article_text(),
        current in article_text(),
        compress in any::<bool>(),
        level in 0u32..=9u32
    ) {
        let previous = RevisionText::from(previous.as_str());
        let current = RevisionText::from(current.as_str());
        let opts = engine::EncodeOptions {
            matcher: MatcherConfig::default(),
            codec: CodecOptions { compress, level, ..Default::default() },
        };
        let mut payload = Vec::new();
        engine::encode_with_options(&previous, &current, &mut payload, &opts).unwrap();
        prop_assert_eq!(engine::decode(&previous, &payload, &opts.codec).unwrap(), current);
    }

    #[test]
    fn prop_raw_units_roundtrip_in_utf16(
        previous in units(300),
        current in units(300)
    ) {
        let previous = RevisionText::from_units(previous);
        let current = RevisionText::from_units(current);
        let parts = diff_units(&MatcherConfig::new(2), previous.as_units(), current.as_units());
        let codec = RevisionCodec::new(CodecOptions {
            charset: TextCharset::Utf16Be,
            ..Default::default()
        });
        let payload = codec.encode_parts(&parts).unwrap();
        let (_, decoded) = codec.decode(&payload).unwrap();
        prop_assert_eq!(&decoded, &parts);
        prop_assert_eq!(apply_parts(&decoded, &previous).unwrap(), current);
    }

    #[test]
    fn prop_identical_text_has_no_parts(text in article_text()) {
        let text = RevisionText::from(text.as_str());
        prop_assert!(engine::compute_diff(&text, &text).is_empty());
        let mut payload = Vec::new();
        engine::encode(&text, &text, &mut payload).unwrap();
        prop_assert_eq!(payload.len(), 3);
    }

    #[test]
    fn prop_header_widths_cover_every_field(
        previous in article_text(),
        current in article_text()
    ) {
        let previous = RevisionText::from(previous.as_str());
        let current = RevisionText::from(current.as_str());
        let parts = engine::compute_diff(&previous, &current);
        let data = RevisionCodec::default().codec_data(&parts).unwrap();
        for part in &parts {
            let (start, length, block) = match part {
                DiffPart::FullRevision { .. } => (0, 0, 0),
                DiffPart::Insert { start, .. } => (*start, 0, 0),
                DiffPart::Delete { start, length } | DiffPart::Replace { start, length, .. } => {
                    (*start, *length, 0)
                }
                DiffPart::Cut { start, length, block_id } => (*start, *length, *block_id),
                DiffPart::Paste { start, block_id } => (*start, 0, *block_id),
            };
            prop_assert!(bits_for(start) <= data.start_bits);
            prop_assert!(bits_for(length) <= data.length_bits);
            prop_assert!(bits_for(block) <= data.block_bits);
        }
    }

    #[test]
    fn prop_moved_paragraph_is_cheaper_than_rewrite(
        a in "[a-z ]{60,120}",
        b in "[A-Z ]{60,120}"
    ) {
        let previous = RevisionText::from(format!("{a}\n{b}\n").as_str());
        let current = RevisionText::from(format!("{b}\n{a}\n").as_str());
        let mut payload = Vec::new();
        engine::encode(&previous, &current, &mut payload).unwrap();
        prop_assert!(payload.len() < current.len(), "payload={} text={}", payload.len(), current.len());
        prop_assert_eq!(engine::decode(&previous, &payload, &CodecOptions::default()).unwrap(), current);
    }
}

#[test]
#[ignore = "performance properties are workload and machine dependent"]
fn perf_property_large_article_not_pathological() {
    use std::time::Instant;
    let paragraph = |i: usize| format!("Paragraph {i} talks about topic {} at some length.\n", i * 7);
    let previous: String = (0..5_000).map(paragraph).collect();
    let current: String = (0..5_000).rev().step_by(2).map(paragraph).collect();
    let previous = RevisionText::from(previous.as_str());
    let current = RevisionText::from(current.as_str());

    let t0 = Instant::now();
    let parts = engine::compute_diff(&previous, &current);
    let elapsed = t0.elapsed();
    assert_eq!(apply_parts(&parts, &previous).unwrap(), current);
    assert!(elapsed.as_secs() < 10, "diff took {elapsed:?}");
}
