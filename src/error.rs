//! Error types for the cursor, the constraint evaluator, the parser, the accessors and
//! schema construction.
//!
//! Every parse failure is field-scoped: [`ParseError`] carries the message type, the dotted
//! path of the offending field and the bit offset at which that field started.

use thiserror::Error;

/// Low-level read failures from [`BitCursor`](crate::cursor::BitCursor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("out of data: need {requested} bits, {remaining} remain")]
    OutOfData { requested: u64, remaining: u64 },
    #[error("cannot read {bits} bits as one integer (1..=64)")]
    InvalidWidth { bits: u64 },
}

/// Failures while evaluating an [`Expr`](crate::constraint::Expr) or
/// [`Predicate`](crate::constraint::Predicate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("field `{0}` is not bound")]
    Unbound(String),
    #[error("field `{path}` holds a {found}, not a number")]
    NotNumeric { path: String, found: &'static str },
    #[error("field `{path}` holds a {found}, not an enumerated value")]
    NotEnumerated { path: String, found: &'static str },
    #[error("`value` has no meaning for a field without a value")]
    NoValue,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("size {0} is negative or too large")]
    InvalidSize(i128),
}

/// Why a decoded value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// A declared constraint evaluated to false.
    #[error("constraint `{0}` failed")]
    Predicate(String),
    #[error("octet {position} is {byte:#04x}, not an ASCII decimal digit")]
    InvalidDigit { position: usize, byte: u8 },
    #[error("code {code} is not in the enumeration")]
    InvalidEnumCode { code: u64 },
    #[error("code {code} is not a boolean")]
    InvalidBoolean { code: u64 },
    #[error("unused bit count {unused} is invalid for {data_bytes} data octets")]
    InvalidUnusedBits { unused: u8, data_bytes: usize },
    #[error("{unused} unused trailing bits are not zero")]
    NonZeroUnusedBits { unused: u8 },
    #[error("nested message consumed {consumed} of {declared} declared bits")]
    SizeMismatch { declared: u64, consumed: u64 },
    #[error("{bits} bits is not a whole number of octets")]
    Misaligned { bits: u64 },
}

/// What went wrong during [`Parser::parse`](crate::parser::Parser::parse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("out of data: need {requested} bits, {remaining} remain")]
    OutOfData { requested: u64, remaining: u64 },
    #[error("constraint violation: {0}")]
    ConstraintViolation(Violation),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("nesting depth exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },
    #[error("cannot evaluate: {0}")]
    Evaluation(EvalError),
    #[error("width of {bits} bits is not supported for this field")]
    UnsupportedWidth { bits: u64 },
    #[error("{bits} bits of trailing data")]
    TrailingData { bits: u64 },
}

impl From<CursorError> for ParseErrorKind {
    fn from(e: CursorError) -> Self {
        match e {
            CursorError::OutOfData { requested, remaining } => {
                ParseErrorKind::OutOfData { requested, remaining }
            }
            CursorError::InvalidWidth { bits } => ParseErrorKind::UnsupportedWidth { bits },
        }
    }
}

impl From<EvalError> for ParseErrorKind {
    fn from(e: EvalError) -> Self {
        ParseErrorKind::Evaluation(e)
    }
}

impl From<Violation> for ParseErrorKind {
    fn from(v: Violation) -> Self {
        ParseErrorKind::ConstraintViolation(v)
    }
}

/// A parse failure scoped to one field of one message type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name}: field `{path}` at bit {bit_offset}: {kind}")]
pub struct ParseError {
    /// Message type requested by the caller.
    pub type_name: String,
    /// Dotted path of the failing field; empty when the failure is not tied to a field.
    pub path: String,
    /// Bit offset at which the failing field started.
    pub bit_offset: u64,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn byte_offset(&self) -> u64 {
        self.bit_offset / 8
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.kind, ParseErrorKind::ConstraintViolation(_))
    }

    pub fn violation(&self) -> Option<&Violation> {
        match &self.kind {
            ParseErrorKind::ConstraintViolation(v) => Some(v),
            _ => None,
        }
    }
}

/// Misuse of the accessors of a parsed [`FieldTree`](crate::value::FieldTree).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("field `{path}` not found")]
    FieldNotFound { path: String },
    #[error("field `{path}` is a {found}, not a {expected}")]
    WrongKind {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Rejections while building or loading a [`Schema`](crate::schema::Schema).
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate message type `{0}`")]
    DuplicateType(String),
    #[error("{type_name}: duplicate field `{field}`")]
    DuplicateField { type_name: String, field: String },
    #[error("{type_name}.{field}: unknown message type `{target}`")]
    UnknownType {
        type_name: String,
        field: String,
        target: String,
    },
    #[error("{type_name}.{field}: `{reference}` does not name an earlier field")]
    UnknownReference {
        type_name: String,
        field: String,
        reference: String,
    },
    #[error("{type_name}.{field}: invalid size: {reason}")]
    InvalidSize {
        type_name: String,
        field: String,
        reason: String,
    },
    #[error("{type_name}.{field}: {reason}")]
    InvalidField {
        type_name: String,
        field: String,
        reason: String,
    },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}
