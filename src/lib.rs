//! # bitschema: schema-driven binary message parser
//!
//! Parses bit-level binary messages against a graph of field descriptors and returns a
//! validated, queryable tree of field values.
//!
//! ## Schema structure
//!
//! - **Message types**: named, ordered lists of field descriptors
//! - **Field descriptors**: kind, size, value constraints, presence condition
//! - **Chains**: a `Next` field links a record to its successor of the same (or another) type
//!
//! ## Field kinds
//!
//! - `Integer`, `Boolean`, `Enumerated` (1..=64 bits, MSB-first)
//! - `Octets`, `BitString` (unused-bits octet plus data), `Decimal` (ASCII digits)
//! - `Message` (nested, optionally sized), `Next` (chain link), `Marker` (no data)
//!
//! Sizes are literal, computed from earlier fields ([`constraint::Expr`]), or the remainder of
//! the enclosing scope. A sized nested message must fill its window exactly.
//!
//! ## Example
//!
//! ```
//! use bitschema::{der, Parser};
//! use std::sync::Arc;
//!
//! let parser = Parser::new(Arc::new(der::schema().unwrap()));
//! let tree = parser.parse(der::MESSAGE, &[0x05, 0x00]).unwrap();
//! assert_eq!(tree.label("class").unwrap(), "Universal");
//! assert_eq!(tree.integer("number").unwrap(), 5);
//! assert!(!tree.contains("null"));
//! ```
//!
//! The [`der`] module carries a descriptor set for a subset of ASN.1 DER; `tests/der.rs` has
//! more examples.

pub mod config;
pub mod constraint;
pub mod cursor;
pub mod der;
pub mod dump;
pub mod error;
pub mod parser;
pub mod schema;
pub mod value;

pub use config::ParserConfig;
pub use constraint::{CmpOp, Expr, Predicate};
pub use error::{AccessError, ParseError, ParseErrorKind, SchemaError, Violation};
pub use parser::Parser;
pub use schema::{EnumCase, FieldDescriptor, FieldKind, MessageType, Schema, SizeSpec, Unit};
pub use value::{BitString, Chain, FieldTree, Fields, RecordId, Value};
