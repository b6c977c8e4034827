//! DER tests: tag/length headers, universal types, timestamps, sequences and
//! sub-identifier chains, parsed with the prebuilt `der` descriptor set.

use bitschema::der;
use bitschema::{AccessError, ParseError, ParseErrorKind, Parser, ParserConfig, Violation};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn parser() -> Parser {
    Parser::new(Arc::new(der::schema().expect("der schema")))
}

fn parse(bytes: &[u8]) -> Result<bitschema::FieldTree, ParseError> {
    parser().parse(der::MESSAGE, bytes)
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    assert!(content.len() < 128);
    let mut out = vec![tag, content.len() as u8];
    out.extend_from_slice(content);
    out
}

const CONTENT_FIELDS: &[&str] = &[
    "boolean",
    "integer",
    "bit_string",
    "octet_string",
    "null",
    "object_identifier",
    "sequence",
    "set",
    "utc_time",
    "generalized_time",
    "content",
];

#[test]
fn test_null() {
    let tree = parse(&[0x05, 0x00]).expect("parse");
    assert_eq!(tree.label("class").unwrap(), "Universal");
    assert!(!tree.boolean("constructed").unwrap());
    assert_eq!(tree.integer("number").unwrap(), 5);
    assert_eq!(tree.integer("length").unwrap(), 0);
    for f in CONTENT_FIELDS {
        assert!(!tree.contains(f), "{} should be absent", f);
    }
    assert_eq!(tree.size_bits(), 16);
}

#[test]
fn test_null_with_content_is_rejected() {
    let err = parse(&[0x05, 0x01, 0x00]).unwrap_err();
    assert_eq!(err.path, "null");
    assert!(matches!(err.violation(), Some(Violation::Predicate(_))));
}

#[test]
fn test_integer() {
    let tree = parse(&[0x02, 0x01, 0x2F]).expect("parse");
    assert_eq!(tree.integer("integer").unwrap(), 47);
    assert!(!tree.boolean("constructed").unwrap());
    assert_eq!(tree.label("class").unwrap(), "Universal");

    let tree = parse(&[0x02, 0x03, 0x01, 0x00, 0x01]).expect("parse");
    assert_eq!(tree.integer("integer").unwrap(), 0x010001);
}

#[test]
fn test_truncated_integer_is_out_of_data() {
    let err = parse(&[0x02, 0x05, 0x01]).unwrap_err();
    assert_eq!(err.path, "integer");
    assert_eq!(err.byte_offset(), 2);
    assert_eq!(
        err.kind,
        ParseErrorKind::OutOfData { requested: 40, remaining: 8 }
    );
}

#[test]
fn test_boolean() {
    let tree = parse(&[0x01, 0x01, 0xFF]).expect("parse");
    assert_eq!(tree.label("boolean").unwrap(), "True");
    let tree = parse(&[0x01, 0x01, 0x00]).expect("parse");
    assert_eq!(tree.label("boolean").unwrap(), "False");

    let err = parse(&[0x01, 0x01, 0x7F]).unwrap_err();
    assert_eq!(err.path, "boolean");
    assert_eq!(err.violation(), Some(&Violation::InvalidEnumCode { code: 0x7F }));

    let err = parse(&[0x01, 0x02, 0xFF, 0xFF]).unwrap_err();
    assert_eq!(err.path, "boolean");
    assert!(err.is_constraint_violation());
}

#[test]
fn test_bit_string() {
    let tree = parse(&[0x03, 0x04, 0x06, 0x6E, 0x5D, 0xC0]).expect("parse");
    let bits = tree.bits("bit_string").unwrap();
    assert_eq!(bits.unused, 6);
    assert_eq!(bits.bytes, &[0x6E, 0x5D, 0xC0]);
    assert_eq!(bits.significant_bits(), 18);
}

#[test]
fn test_bit_string_unused_bits() {
    // More than 7 unused bits.
    let err = parse(&[0x03, 0x02, 0x08, 0x00]).unwrap_err();
    assert_eq!(
        err.violation(),
        Some(&Violation::InvalidUnusedBits { unused: 8, data_bytes: 1 })
    );
    // Unused bits without data.
    let err = parse(&[0x03, 0x01, 0x01]).unwrap_err();
    assert_eq!(
        err.violation(),
        Some(&Violation::InvalidUnusedBits { unused: 1, data_bytes: 0 })
    );
    // Empty bit string.
    let tree = parse(&[0x03, 0x01, 0x00]).expect("parse");
    assert!(tree.bits("bit_string").unwrap().bytes.is_empty());
}

#[test]
fn test_bit_string_padding_check_is_configurable() {
    let input = [0x03, 0x02, 0x06, 0xC1];
    assert!(parse(&input).is_ok());

    let strict = Parser::with_config(
        Arc::new(der::schema().unwrap()),
        ParserConfig::default().strict_unused_bits(true),
    );
    let err = strict.parse(der::MESSAGE, &input).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::NonZeroUnusedBits { unused: 6 }));
    assert!(strict
        .parse(der::MESSAGE, &[0x03, 0x04, 0x06, 0x6E, 0x5D, 0xC0])
        .is_ok());
}

#[test]
fn test_octet_string_long_form_length() {
    let mut input = vec![0x04, 0x81, 0x80];
    input.extend((0..128).map(|i| i as u8));
    let tree = parse(&input).expect("parse");
    assert!(tree.boolean("long_form").unwrap());
    assert_eq!(tree.integer("length_octets").unwrap(), 1);
    assert_eq!(tree.integer("long_length").unwrap(), 128);
    assert!(!tree.contains("length"));
    assert_eq!(tree.bytes("octet_string").unwrap().len(), 128);
    assert_eq!(tree.bytes("octet_string").unwrap()[127], 127);
}

#[test]
fn test_non_minimal_and_indefinite_lengths_are_rejected() {
    let err = parse(&[0x04, 0x81, 0x05, 1, 2, 3, 4, 5]).unwrap_err();
    assert_eq!(err.path, "long_length");
    assert!(err.is_constraint_violation());

    let err = parse(&[0x30, 0x80, 0x00, 0x00]).unwrap_err();
    assert_eq!(err.path, "length_octets");
    assert!(err.is_constraint_violation());

    // 128 fits in one length octet, so a leading zero octet is not minimal.
    let mut input = vec![0x04, 0x82, 0x00, 0x80];
    input.extend([0xAB; 128]);
    let err = parse(&input).unwrap_err();
    assert_eq!(err.path, "long_length");
    assert!(err.is_constraint_violation());

    let mut input = vec![0x04, 0x82, 0x01, 0x00];
    input.extend([0xAB; 256]);
    let tree = parse(&input).expect("parse");
    assert_eq!(tree.integer("long_length").unwrap(), 256);
    assert_eq!(tree.bytes("octet_string").unwrap().len(), 256);
}

#[test]
fn test_utc_time_standalone() {
    let p = parser();
    let tree = p.parse(der::UTC_TIME, b"860923175628Z").expect("parse");
    assert_eq!(tree.integer("year").unwrap(), 86);
    assert_eq!(tree.integer("month").unwrap(), 9);
    assert_eq!(tree.integer("day").unwrap(), 23);
    assert_eq!(tree.integer("hour").unwrap(), 17);
    assert_eq!(tree.integer("minute").unwrap(), 56);
    assert_eq!(tree.integer("second").unwrap(), 28);
    assert_eq!(tree.integer("zone").unwrap(), b'Z' as u64);

    let err = p.parse(der::UTC_TIME, b"221323175628Z").unwrap_err();
    assert_eq!(err.path, "month");
    assert_eq!(err.byte_offset(), 2);
    assert!(err.is_constraint_violation());
}

#[test]
fn test_utc_time_in_message() {
    let tree = parse(&tlv(0x17, b"860923175628Z")).expect("parse");
    assert_eq!(tree.integer("utc_time.month").unwrap(), 9);
    assert_eq!(tree.message("utc_time").unwrap().type_name(), der::UTC_TIME);

    let err = parse(&tlv(0x17, b"221323175628Z")).unwrap_err();
    assert_eq!(err.path, "utc_time.month");
    assert_eq!(err.byte_offset(), 4);
}

#[test]
fn test_leap_second() {
    let p = parser();
    let tree = p.parse(der::UTC_TIME, b"860923175660Z").expect("parse");
    assert_eq!(tree.integer("second").unwrap(), 60);

    let err = p.parse(der::UTC_TIME, b"860923175661Z").unwrap_err();
    assert_eq!(err.path, "second");
    assert!(err.is_constraint_violation());
}

#[test]
fn test_time_rejects_non_digits_and_zone() {
    let p = parser();
    let err = p.parse(der::UTC_TIME, b"86O923175628Z").unwrap_err();
    assert_eq!(err.path, "month");
    assert_eq!(
        err.violation(),
        Some(&Violation::InvalidDigit { position: 0, byte: b'O' })
    );
    let err = p.parse(der::UTC_TIME, b"860923175628+").unwrap_err();
    assert_eq!(err.path, "zone");
}

#[test]
fn test_utc_time_length_must_match() {
    let mut content = b"860923175628Z".to_vec();
    content.push(b'0');
    let err = parse(&tlv(0x17, &content)).unwrap_err();
    assert_eq!(err.path, "utc_time");
    assert_eq!(
        err.violation(),
        Some(&Violation::SizeMismatch { declared: 112, consumed: 104 })
    );
}

#[test]
fn test_generalized_time() {
    let tree = parse(&tlv(0x18, b"19851106210627Z")).expect("parse");
    assert_eq!(tree.integer("generalized_time.century").unwrap(), 19);
    assert_eq!(tree.integer("generalized_time.year").unwrap(), 85);
    assert_eq!(tree.integer("generalized_time.month").unwrap(), 11);
    assert_eq!(tree.integer("generalized_time.second").unwrap(), 27);
}

#[test]
fn test_sub_identifier_chain() {
    let tree = parser()
        .parse(der::SUBIDENTIFIER, &[0x90, 0xA0, 0xB0, 0xC0, 0x50])
        .expect("parse");
    let values: Vec<u64> = tree
        .root()
        .chain()
        .map(|node| node.integer("value").unwrap())
        .collect();
    assert_eq!(values, vec![0x10, 0x20, 0x30, 0x40, 0x50]);
    let last = tree.root().chain().last().unwrap();
    assert!(!last.has_next());
    assert!(!last.contains("next"));
    assert_eq!(tree.record_count(), 5);
}

#[test]
fn test_object_identifier() {
    // 1.2.840 encoded as 42, 840
    let tree = parse(&[0x06, 0x03, 0x2A, 0x86, 0x48]).expect("parse");
    let arcs: Vec<u64> = tree
        .message("object_identifier")
        .unwrap()
        .chain()
        .map(|arcs| {
            arcs.message("arc")
                .unwrap()
                .chain()
                .fold(0, |acc, n| (acc << 7) | n.integer("value").unwrap())
        })
        .collect();
    assert_eq!(arcs, vec![42, 840]);
}

#[test]
fn test_empty_object_identifier_is_rejected() {
    let err = parse(&[0x06, 0x00]).unwrap_err();
    assert_eq!(err.path, "object_identifier_length");
    assert!(err.is_constraint_violation());
}

#[test]
fn test_long_object_identifier_parses_in_linear_time() {
    let arcs = 100_000;
    let mut input = vec![0x06, 0x83, (arcs >> 16) as u8, (arcs >> 8) as u8, arcs as u8];
    input.extend(std::iter::repeat(0x01).take(arcs));
    let started = Instant::now();
    let tree = parse(&input).expect("parse");
    let elapsed = started.elapsed();
    assert_eq!(tree.message("object_identifier").unwrap().chain().count(), arcs);
    assert!(elapsed < Duration::from_secs(5), "{} arcs took {:?}", arcs, elapsed);
}

#[test]
fn test_object_identifier_truncated_chain() {
    let err = parse(&[0x06, 0x02, 0x2A, 0x86]).unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::OutOfData { .. }));
    assert_eq!(err.path, "object_identifier.rest.arc.next.more");
}

#[test]
fn test_sequence() {
    let tree = parse(&[0x30, 0x06, 0x02, 0x01, 0x05, 0x01, 0x01, 0xFF]).expect("parse");
    assert!(tree.boolean("constructed").unwrap());
    assert_eq!(tree.integer("sequence.element.integer").unwrap(), 5);
    assert_eq!(tree.label("sequence.rest.element.boolean").unwrap(), "True");

    let elements: Vec<_> = tree.message("sequence").unwrap().chain().collect();
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].integer("element.number").unwrap(), 2);
    assert_eq!(elements[1].integer("element.number").unwrap(), 1);
    assert!(!elements[1].has_next());
}

#[test]
fn test_empty_sequence_and_set() {
    let tree = parse(&[0x30, 0x00]).expect("parse");
    assert!(!tree.contains("sequence"));
    assert!(!tree.contains("content"));
    let tree = parse(&tlv(0x31, &[0x05, 0x00])).expect("parse");
    assert_eq!(tree.integer("set.element.number").unwrap(), 5);
}

#[test]
fn test_sequence_element_overruns_window() {
    let err = parse(&[0x30, 0x02, 0x02, 0x01, 0x05]).unwrap_err();
    assert_eq!(err.path, "sequence.element.integer");
    assert!(matches!(err.kind, ParseErrorKind::OutOfData { .. }));
}

#[test]
fn test_nested_sequences_hit_depth_limit() {
    let nested = |levels: usize| {
        let mut buf = vec![0x30, 0x00];
        for _ in 0..levels {
            buf = tlv(0x30, &buf);
        }
        buf
    };
    assert!(parse(&nested(10)).is_ok());
    let err = parse(&nested(40)).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::DepthExceeded { limit: 64 });
}

#[test]
fn test_other_tags_keep_raw_content() {
    let tree = parse(&[0xA0, 0x03, 0x02, 0x01, 0x01]).expect("parse");
    assert_eq!(tree.label("class").unwrap(), "Context_Specific");
    assert!(tree.boolean("constructed").unwrap());
    assert_eq!(tree.bytes("content").unwrap(), &[0x02, 0x01, 0x01]);
}

#[test]
fn test_multi_octet_tag_is_rejected() {
    let err = parse(&[0x1F, 0x81, 0x00]).unwrap_err();
    assert_eq!(err.path, "number");
    assert!(err.is_constraint_violation());
}

#[test]
fn test_accessor_misuse() {
    let tree = parse(&[0x05, 0x00]).expect("parse");
    assert_eq!(
        tree.get("long_length").unwrap_err(),
        AccessError::FieldNotFound { path: "long_length".into() }
    );
    assert_eq!(
        tree.integer("class").unwrap_err(),
        AccessError::WrongKind {
            path: "class".into(),
            expected: "integer",
            found: "enumerated value",
        }
    );
    assert!(matches!(
        tree.integer("length.deeper"),
        Err(AccessError::FieldNotFound { .. })
    ));
}

#[test]
fn test_trailing_data_policy() {
    assert_eq!(parse(&[0x05, 0x00, 0xFF]).unwrap().size_bits(), 16);
    let strict = Parser::with_config(
        Arc::new(der::schema().unwrap()),
        ParserConfig::default().reject_trailing_data(true),
    );
    let err = strict.parse(der::MESSAGE, &[0x05, 0x00, 0xFF]).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::TrailingData { bits: 8 });
}

#[test]
fn test_unknown_type() {
    let err = parser().parse("Certificate", &[0x30, 0x00]).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnknownType("Certificate".into()));
}

#[test]
fn test_dump() {
    let tree = parse(&[0x30, 0x03, 0x02, 0x01, 0x2F]).expect("parse");
    let text = tree.to_string();
    assert!(text.starts_with("Message\n"));
    assert!(text.contains("  class: Universal (0)"));
    assert!(text.contains("  sequence: Elements {"));
    assert!(text.contains("      integer: 47"));
}
