//! Descriptor set for a subset of ASN.1 DER.
//!
//! Covers single-octet tags, short and long definite lengths, and the universal types
//! BOOLEAN, INTEGER, BIT STRING, OCTET STRING, NULL, OBJECT IDENTIFIER, SEQUENCE, SET,
//! UTCTime and GeneralizedTime. Any other tag keeps its content as raw octets in `content`.
//!
//! | Type | Fields |
//! |------|--------|
//! | `Message` | `class`, `constructed`, `number`, `long_form`, `length` or `length_octets` + `long_length`, then one content field |
//! | `Elements` | `element` (a `Message`), `rest` (chain link while content remains) |
//! | `Arcs` | `arc` (a `Subidentifier` chain), `rest` |
//! | `Subidentifier` | `more`, `value` (7 bits), `next` while `more` is set |
//! | `UtcTime` | `year`, `month`, `day`, `hour`, `minute`, `second`, `zone` |
//! | `GeneralizedTime` | `century` followed by the `UtcTime` fields |

use crate::constraint::{CmpOp, Expr, Predicate};
use crate::error::SchemaError;
use crate::schema::{FieldDescriptor as F, MessageType, Schema, SizeSpec, Unit};

pub const MESSAGE: &str = "Message";
pub const ELEMENTS: &str = "Elements";
pub const ARCS: &str = "Arcs";
pub const SUBIDENTIFIER: &str = "Subidentifier";
pub const UTC_TIME: &str = "UtcTime";
pub const GENERALIZED_TIME: &str = "GeneralizedTime";

/// Universal tags with a dedicated content field: (number, constructed, field name).
const UNIVERSAL: &[(i64, bool, &str)] = &[
    (1, false, "boolean"),
    (2, false, "integer"),
    (3, false, "bit_string"),
    (4, false, "octet_string"),
    (5, false, "null"),
    (6, false, "object_identifier"),
    (16, true, "sequence"),
    (17, true, "set"),
    (23, false, "utc_time"),
    (24, false, "generalized_time"),
];

fn universal(number: i64, constructed: bool) -> Predicate {
    Predicate::is("class", "Universal")
        .and(Predicate::field_eq("constructed", constructed as i64))
        .and(Predicate::field_eq("number", number))
}

fn tag(name: &str) -> Predicate {
    UNIVERSAL
        .iter()
        .find(|(_, _, n)| *n == name)
        .map(|&(number, constructed, _)| universal(number, constructed))
        .unwrap_or(Predicate::True)
}

/// Content length in octets, whichever length form was used.
fn content_length() -> Expr {
    Expr::cond(
        Predicate::field_eq("long_form", 1),
        Expr::field("long_length"),
        Expr::field("length"),
    )
}

fn content() -> SizeSpec {
    SizeSpec::Dynamic {
        expr: content_length(),
        unit: Unit::Bytes,
    }
}

/// Smallest value that needs `length_octets` octets to encode.
fn minimal_long_length() -> Expr {
    (1..8).rev().fold(Expr::lit(1 << 56), |otherwise, octets: i64| {
        let min = if octets == 1 { 128 } else { 1 << (8 * (octets - 1)) };
        Expr::cond(Predicate::field_eq("length_octets", octets), Expr::lit(min), otherwise)
    })
}

fn non_empty() -> Predicate {
    Predicate::cmp(CmpOp::Gt, content_length(), Expr::lit(0))
}

fn message() -> MessageType {
    let other = Predicate::Or(
        UNIVERSAL
            .iter()
            .map(|&(number, constructed, _)| universal(number, constructed))
            .collect(),
    )
    .negate();

    MessageType::new(MESSAGE)
        .field(F::enumerated(
            "class",
            2,
            [(0, "Universal"), (1, "Application"), (2, "Context_Specific"), (3, "Private")],
        ))
        .field(F::boolean("constructed", 1))
        // 31 announces the multi-octet tag form, which is not supported.
        .field(F::integer("number", 5).constraint(Predicate::value_in(0, 30)))
        .field(F::boolean("long_form", 1))
        .field(F::integer("length", 7).when(Predicate::field_eq("long_form", 0)))
        .field(
            F::integer("length_octets", 7)
                .when(Predicate::field_eq("long_form", 1))
                .constraint(Predicate::value_in(1, 8)),
        )
        .field(
            F::integer("long_length", 8)
                .sized(SizeSpec::bytes_of("length_octets"))
                .when(Predicate::field_eq("long_form", 1))
                // DER requires the short form below 128 and no leading zero octets.
                .constraint(Predicate::cmp(CmpOp::Ge, Expr::Value, minimal_long_length())),
        )
        .field(
            F::enumerated("boolean", 8, [(0x00, "False"), (0xFF, "True")])
                .when(tag("boolean"))
                .constraint(Predicate::eq(content_length(), Expr::lit(1))),
        )
        .field(F::integer("integer", 8).sized(content()).when(tag("integer")))
        .field(F::bit_string("bit_string", content()).when(tag("bit_string")))
        .field(F::octets("octet_string", content()).when(tag("octet_string")))
        .field(
            F::marker("null")
                .when(tag("null"))
                .constraint(Predicate::eq(content_length(), Expr::lit(0))),
        )
        .field(
            F::marker("object_identifier_length")
                .when(tag("object_identifier"))
                .constraint(non_empty()),
        )
        .field(
            F::message("object_identifier", ARCS)
                .sized(content())
                .when(tag("object_identifier")),
        )
        .field(
            F::message("sequence", ELEMENTS)
                .sized(content())
                .when(tag("sequence").and(non_empty())),
        )
        .field(
            F::message("set", ELEMENTS)
                .sized(content())
                .when(tag("set").and(non_empty())),
        )
        .field(F::message("utc_time", UTC_TIME).sized(content()).when(tag("utc_time")))
        .field(
            F::message("generalized_time", GENERALIZED_TIME)
                .sized(content())
                .when(tag("generalized_time")),
        )
        .field(F::octets("content", content()).when(other))
}

fn time(name: &str, with_century: bool) -> MessageType {
    let mut t = MessageType::new(name);
    if with_century {
        t = t.field(F::decimal("century", 2));
    }
    t.field(F::decimal("year", 2))
        .field(F::decimal("month", 2).constraint(Predicate::value_in(1, 12)))
        .field(F::decimal("day", 2).constraint(Predicate::value_in(1, 31)))
        .field(F::decimal("hour", 2).constraint(Predicate::value_in(0, 23)))
        .field(F::decimal("minute", 2).constraint(Predicate::value_in(0, 59)))
        // 60 admits a leap second.
        .field(F::decimal("second", 2).constraint(Predicate::value_in(0, 60)))
        .field(F::integer("zone", 8).constraint(Predicate::value_eq(b'Z' as i64)))
}

/// All DER message types.
pub fn types() -> Vec<MessageType> {
    vec![
        message(),
        MessageType::new(ELEMENTS)
            .field(F::message("element", MESSAGE))
            .field(F::next("rest", ELEMENTS)),
        MessageType::new(ARCS)
            .field(F::message("arc", SUBIDENTIFIER))
            .field(F::next("rest", ARCS)),
        MessageType::new(SUBIDENTIFIER)
            .field(F::boolean("more", 1))
            .field(F::integer("value", 7))
            .field(F::next("next", SUBIDENTIFIER).when(Predicate::field_eq("more", 1))),
        time(UTC_TIME, false),
        time(GENERALIZED_TIME, true),
    ]
}

pub fn schema() -> Result<Schema, SchemaError> {
    Schema::new(types())
}
