use revdelta::codec::payload::{COMPRESSED_MARKER, COMPRESSED_TEXT_MARKER, MIN_COMPRESS_SIZE};
use revdelta::codec::{CodecOptions, DecodeError, RevisionCodec, RevisionCodecData, TextCharset};
use revdelta::diff::{Diff, DiffMetadata, DiffPart};
use revdelta::engine;
use revdelta::revision::RevisionText;

fn codec(charset: TextCharset, compress: bool) -> RevisionCodec {
    RevisionCodec::new(CodecOptions {
        charset,
        compress,
        level: 9,
    })
}

fn sample_parts() -> Vec<DiffPart> {
    vec![
        DiffPart::Cut {
            start: 0,
            length: 40,
            block_id: 1,
        },
        DiffPart::Replace {
            start: 41,
            length: 3,
            text: "caf\u{00e9} \u{1F600}".into(),
        },
        DiffPart::Insert {
            start: 70,
            text: "tail".into(),
        },
        DiffPart::Paste {
            start: 80,
            block_id: 1,
        },
        DiffPart::Delete {
            start: 90,
            length: 1000,
        },
    ]
}

#[test]
fn every_charset_roundtrips_mixed_parts() {
    let parts = sample_parts();
    for charset in [TextCharset::Utf8, TextCharset::Utf16Le, TextCharset::Utf16Be] {
        let codec = codec(charset, false);
        let payload = codec.encode_parts(&parts).unwrap();
        let (data, decoded) = codec.decode(&payload).unwrap();
        assert_eq!(decoded, parts, "{charset}");
        assert_eq!(data, codec.codec_data(&parts).unwrap());
        assert_eq!(data.block_bits, 1);
        assert_eq!(data.length_bits, 10);
    }
}

#[test]
fn header_only_payload_decodes_to_nothing() {
    let (data, parts) = RevisionCodec::default().decode(&[0, 0, 0]).unwrap();
    assert_eq!(data, RevisionCodecData::default());
    assert!(parts.is_empty());
}

#[test]
fn malformed_payloads_are_rejected() {
    let codec = RevisionCodec::default();
    assert_eq!(codec.decode(&[]), Err(DecodeError::Empty));
    assert!(matches!(
        codec.decode(&[0, 0, 0, 0b1110_0000]),
        Err(DecodeError::UnknownAction { code: 7, .. })
    ));
    // Insert announcing three text bytes with none following.
    assert!(matches!(
        codec.decode(&[0x00, 0x00, 0x06, 0b0100_1100]),
        Err(DecodeError::Truncated { context: "text", .. })
    ));
    assert!(codec.decode(&[COMPRESSED_MARKER, 1, 2, 3]).is_err());
    assert!(codec.decode_text("!!not base64!!").is_err());
}

#[test]
fn short_bodies_are_never_deflated() {
    let parts = vec![DiffPart::Insert {
        start: 3,
        text: "x".into(),
    }];
    let codec = codec(TextCharset::Utf8, true);
    let payload = codec.encode_parts(&parts).unwrap();
    assert!(payload.len() < MIN_COMPRESS_SIZE);
    assert_ne!(payload[0], COMPRESSED_MARKER);
}

#[test]
fn repetitive_bodies_are_deflated_in_both_transports() {
    let text = RevisionText::from("lorem ipsum dolor sit amet ".repeat(40).as_str());
    let diff = Diff::full_revision(text.clone(), DiffMetadata::default());
    let codec = codec(TextCharset::Utf8, true);

    let binary = codec.encode(&diff).unwrap();
    assert_eq!(binary[0], COMPRESSED_MARKER);
    assert!(binary.len() < text.len() / 4);
    assert_eq!(codec.decode(&binary).unwrap().1, diff.parts);

    let transport = codec.encode_text(&diff).unwrap();
    assert!(transport.starts_with(COMPRESSED_TEXT_MARKER));
    assert_eq!(codec.decode_text(&transport).unwrap().1, diff.parts);

    let plain = RevisionCodec::default().encode_text(&diff).unwrap();
    assert!(!plain.starts_with(COMPRESSED_TEXT_MARKER));
    assert!(plain.len() > transport.len());
}

#[test]
fn unpaired_surrogates_need_a_utf16_charset() {
    let parts = vec![DiffPart::FullRevision {
        text: RevisionText::from_units(vec![0x41, 0xDBFF]),
    }];
    assert!(codec(TextCharset::Utf8, false).encode_parts(&parts).is_err());
    let codec = codec(TextCharset::Utf16Le, false);
    let payload = codec.encode_parts(&parts).unwrap();
    assert_eq!(codec.decode(&payload).unwrap().1, parts);
}

#[test]
fn engine_roundtrips_with_non_default_options() {
    let previous = RevisionText::from("Intro.\n\n== A ==\nalpha alpha alpha\n\n== B ==\nbeta beta beta\n");
    let current = RevisionText::from("Intro!\n\n== B ==\nbeta beta beta\n\n== A ==\nalpha alpha alpha\n");
    let opts = engine::EncodeOptions {
        matcher: revdelta::matching::MatcherConfig::new(7),
        codec: CodecOptions {
            charset: TextCharset::Utf16Be,
            compress: true,
            level: 1,
        },
    };
    let mut payload = Vec::new();
    engine::encode_with_options(&previous, &current, &mut payload, &opts).unwrap();
    assert_eq!(engine::decode(&previous, &payload, &opts.codec).unwrap(), current);
}
