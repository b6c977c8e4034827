//! Parse binary messages against a [`Schema`].
//!
//! The parser walks the descriptors of a message type in order. For each field it evaluates
//! the presence condition, resolves the size, decodes the raw value through the shared
//! [`BitCursor`], checks the constraints and binds the value. Nested messages and chain links
//! do not recurse on the host stack: they push a [`Frame`] onto an explicit stack and share
//! the cursor with their parent.
//!
//! A frame with no descriptors left and no bounded window is replaced by the child it
//! pushes, so a chain of `Next` links in tail position runs at constant depth. The
//! replacement only happens if the parent's record consumed input; a link that made no
//! progress keeps its parent frame and eventually hits [`ParserConfig::max_depth`].
//!
//! Any failure aborts the whole parse. No partial tree is returned. Dotted field paths are
//! only rendered for the error; during the walk each record just remembers the record and
//! field it hangs from.

use crate::config::ParserConfig;
use crate::constraint::Env;
use crate::cursor::BitCursor;
use crate::error::{EvalError, ParseError, ParseErrorKind, Violation};
use crate::schema::{EnumCase, FieldDescriptor, FieldKind, MessageType, Schema, SizeSpec, MAX_DECIMAL_DIGITS};
use crate::value::{FieldTree, Record, RecordId, Value};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct Parser {
    schema: Arc<Schema>,
    config: ParserConfig,
}

/// Bounded region a sized nested message must fill exactly.
struct Window {
    start: u64,
    end: u64,
    outer_limit: u64,
}

struct Frame<'s> {
    ty: &'s MessageType,
    next_field: usize,
    record: RecordId,
    /// Bit position at which the record began.
    start: u64,
    window: Option<Window>,
}

impl Frame<'_> {
    fn is_exhausted(&self) -> bool {
        self.next_field >= self.ty.fields.len()
    }
}

/// Mutable state of one parse call.
struct Run<'s, 'a> {
    cursor: BitCursor<'a>,
    records: Vec<Record>,
    stack: Vec<Frame<'s>>,
    /// Parent record and field name of each record, indexed like `records`; `None` for the root.
    origins: Vec<Option<(RecordId, &'s str)>>,
}

impl Run<'_, '_> {
    /// Dotted path of `field` inside `record`, or of `record` itself when `field` is `None`.
    fn path_of(&self, record: RecordId, field: Option<&str>) -> String {
        let mut segments: Vec<&str> = field.into_iter().collect();
        let mut at = record;
        while let Some(Some((parent, name))) = self.origins.get(at.0) {
            segments.push(*name);
            at = *parent;
        }
        segments.reverse();
        segments.join(".")
    }
}

impl Parser {
    pub fn new(schema: Arc<Schema>) -> Self {
        Parser::with_config(schema, ParserConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: ParserConfig) -> Self {
        Parser { schema, config }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse `bytes` as a message of type `type_name`.
    pub fn parse(&self, type_name: &str, bytes: &[u8]) -> Result<FieldTree, ParseError> {
        debug!(type_name, len = bytes.len(), "parse start");
        let result = self.run(type_name, bytes);
        match &result {
            Ok(tree) => debug!(
                type_name,
                bits = tree.size_bits(),
                records = tree.record_count(),
                "parse ok"
            ),
            Err(e) => debug!(type_name, error = %e, "parse failed"),
        }
        result
    }

    fn run(&self, type_name: &str, bytes: &[u8]) -> Result<FieldTree, ParseError> {
        let fail = |path: String, bit_offset: u64, kind: ParseErrorKind| ParseError {
            type_name: type_name.to_string(),
            path,
            bit_offset,
            kind,
        };
        let root = self
            .schema
            .resolve(type_name)
            .map_err(|kind| fail(String::new(), 0, kind))?;

        let mut run = Run {
            cursor: BitCursor::new(bytes),
            records: vec![Record::new(&root.name)],
            stack: vec![Frame {
                ty: root,
                next_field: 0,
                record: RecordId(0),
                start: 0,
                window: None,
            }],
            origins: vec![None],
        };

        while let Some(frame) = run.stack.last_mut() {
            if frame.is_exhausted() {
                if let Some(done) = run.stack.pop() {
                    if let Err((record, offset, kind)) = self.close_frame(&mut run.cursor, done) {
                        return Err(fail(run.path_of(record, None), offset, kind));
                    }
                }
                continue;
            }
            let ty = frame.ty;
            let field = &ty.fields[frame.next_field];
            frame.next_field += 1;
            let record = frame.record;
            let offset = run.cursor.position();
            if let Err(kind) = self.step(&mut run, field, record) {
                return Err(fail(run.path_of(record, Some(&field.name)), offset, kind));
            }
        }

        let consumed = run.cursor.position();
        let trailing = run.cursor.remaining_bits();
        if self.config.reject_trailing_data && trailing > 0 {
            return Err(fail(
                String::new(),
                consumed,
                ParseErrorKind::TrailingData { bits: trailing },
            ));
        }
        Ok(FieldTree::new(run.records, consumed))
    }

    /// Verify a finished frame filled its window and widen the cursor back.
    fn close_frame(
        &self,
        cursor: &mut BitCursor<'_>,
        done: Frame<'_>,
    ) -> Result<(), (RecordId, u64, ParseErrorKind)> {
        if let Some(w) = done.window {
            let pos = cursor.position();
            if pos != w.end {
                let kind = Violation::SizeMismatch {
                    declared: w.end - w.start,
                    consumed: pos - w.start,
                };
                return Err((done.record, w.start, kind.into()));
            }
            cursor.restore(w.outer_limit);
        }
        Ok(())
    }

    fn step<'s>(
        &'s self,
        run: &mut Run<'s, '_>,
        field: &'s FieldDescriptor,
        record: RecordId,
    ) -> Result<(), ParseErrorKind> {
        let size = {
            let env = Env::new(&run.records, record, None);
            let present = match (&field.condition, &field.kind) {
                (Some(c), _) => c.eval(&env)?,
                // An ungated link continues while the scope has data.
                (None, FieldKind::Next(_)) => run.cursor.remaining_bits() > 0,
                (None, _) => true,
            };
            if !present {
                trace!(field = %field.name, "skipped");
                return Ok(());
            }
            resolve_size(&field.size, &env, &run.cursor)?
        };

        let value = match &field.kind {
            FieldKind::Message(target) | FieldKind::Next(target) => {
                return self.open_frame(run, field, target, size, record);
            }
            FieldKind::Marker => {
                let env = Env::new(&run.records, record, None);
                check_constraints(field, &env)?;
                trace!(field = %field.name, "marker");
                return Ok(());
            }
            FieldKind::Integer => Value::Integer(run.cursor.read_bits(width(size)?)?),
            FieldKind::Boolean => match run.cursor.read_bits(width(size)?)? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                code => return Err(Violation::InvalidBoolean { code }.into()),
            },
            FieldKind::Enumerated(cases) => {
                let code = run.cursor.read_bits(width(size)?)?;
                enum_value(cases, code)?
            }
            FieldKind::Octets => {
                let n = octets(width(size)?)?;
                Value::Bytes(run.cursor.read_bytes(n)?)
            }
            FieldKind::Decimal => decode_decimal(&mut run.cursor, width(size)?)?,
            FieldKind::BitString => {
                decode_bit_string(&mut run.cursor, width(size)?, self.config.strict_unused_bits)?
            }
        };

        {
            let env = Env::new(&run.records, record, Some(&value));
            check_constraints(field, &env)?;
        }
        trace!(field = %field.name, value = ?value, "bound");
        run.records[record.0].bind(&field.name, value);
        Ok(())
    }

    fn open_frame<'s>(
        &'s self,
        run: &mut Run<'s, '_>,
        field: &'s FieldDescriptor,
        target: &str,
        size: Option<u64>,
        record: RecordId,
    ) -> Result<(), ParseErrorKind> {
        let ty = self.schema.resolve(target)?;
        let start = run.cursor.position();
        let window = match size {
            Some(bits) => {
                let outer_limit = run.cursor.narrow(bits)?;
                Some(Window {
                    start,
                    end: start + bits,
                    outer_limit,
                })
            }
            None => None,
        };

        let child = RecordId(run.records.len());
        run.records.push(Record::new(&ty.name));
        run.origins.push(Some((record, field.name.as_str())));
        let parent = &mut run.records[record.0];
        parent.bind(&field.name, Value::Record(child));
        if matches!(field.kind, FieldKind::Next(_)) {
            parent.next = Some(child);
        }

        let replace_parent = run
            .stack
            .last()
            .map(|top| top.is_exhausted() && top.window.is_none() && start > top.start)
            .unwrap_or(false);
        if replace_parent {
            run.stack.pop();
        }
        if run.stack.len() >= self.config.max_depth {
            return Err(ParseErrorKind::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        trace!(field = %field.name, type_name = %ty.name, "enter");
        run.stack.push(Frame {
            ty,
            next_field: 0,
            record: child,
            start,
            window,
        });
        Ok(())
    }
}

fn resolve_size(
    size: &SizeSpec,
    env: &Env<'_>,
    cursor: &BitCursor<'_>,
) -> Result<Option<u64>, ParseErrorKind> {
    Ok(match size {
        SizeSpec::Implicit => None,
        SizeSpec::Bits(n) => Some(*n),
        SizeSpec::Bytes(n) => Some(
            n.checked_mul(8)
                .ok_or(ParseErrorKind::UnsupportedWidth { bits: u64::MAX })?,
        ),
        SizeSpec::Dynamic { expr, unit } => {
            let v = expr.eval(env)?;
            let bits = u64::try_from(v)
                .ok()
                .and_then(|n| n.checked_mul(unit.bits_per_unit()))
                .ok_or(EvalError::InvalidSize(v))?;
            Some(bits)
        }
        SizeSpec::Remainder => Some(cursor.remaining_bits()),
    })
}

/// Scalar kinds always carry a size; the schema rejects them otherwise.
fn width(size: Option<u64>) -> Result<u64, ParseErrorKind> {
    size.ok_or(ParseErrorKind::UnsupportedWidth { bits: 0 })
}

fn octets(bits: u64) -> Result<usize, ParseErrorKind> {
    if bits % 8 != 0 {
        return Err(Violation::Misaligned { bits }.into());
    }
    usize::try_from(bits / 8).map_err(|_| ParseErrorKind::UnsupportedWidth { bits })
}

fn check_constraints(field: &FieldDescriptor, env: &Env<'_>) -> Result<(), ParseErrorKind> {
    for c in &field.constraints {
        if !c.eval(env)? {
            return Err(Violation::Predicate(c.to_string()).into());
        }
    }
    Ok(())
}

fn enum_value(cases: &[EnumCase], code: u64) -> Result<Value, ParseErrorKind> {
    cases
        .iter()
        .find(|c| c.code == code)
        .map(|c| Value::Enum {
            code,
            label: c.label.clone(),
        })
        .ok_or_else(|| Violation::InvalidEnumCode { code }.into())
}

fn decode_decimal(cursor: &mut BitCursor<'_>, bits: u64) -> Result<Value, ParseErrorKind> {
    let digits = octets(bits)?;
    if digits == 0 || digits as u64 > MAX_DECIMAL_DIGITS {
        return Err(ParseErrorKind::UnsupportedWidth { bits });
    }
    let raw = cursor.read_bytes(digits)?;
    let mut n = 0u64;
    for (position, &byte) in raw.iter().enumerate() {
        if !byte.is_ascii_digit() {
            return Err(Violation::InvalidDigit { position, byte }.into());
        }
        n = n * 10 + (byte - b'0') as u64;
    }
    Ok(Value::Integer(n))
}

fn decode_bit_string(
    cursor: &mut BitCursor<'_>,
    bits: u64,
    strict: bool,
) -> Result<Value, ParseErrorKind> {
    let total = octets(bits)?;
    if total == 0 {
        return Err(ParseErrorKind::UnsupportedWidth { bits });
    }
    let unused = cursor.read_bits(8)? as u8;
    let bytes = cursor.read_bytes(total - 1)?;
    if unused > 7 || (bytes.is_empty() && unused != 0) {
        return Err(Violation::InvalidUnusedBits {
            unused,
            data_bytes: bytes.len(),
        }
        .into());
    }
    if strict && unused > 0 {
        let mask = (1u8 << unused) - 1;
        if bytes.last().map(|b| b & mask != 0).unwrap_or(false) {
            return Err(Violation::NonZeroUnusedBits { unused }.into());
        }
    }
    Ok(Value::Bits { bytes, unused })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Predicate;
    use crate::schema::FieldDescriptor as F;

    fn parser(types: Vec<MessageType>) -> Parser {
        Parser::new(Arc::new(Schema::new(types).expect("schema")))
    }

    #[test]
    fn decimal_digits() {
        let p = parser(vec![MessageType::new("D").field(F::decimal("n", 3))]);
        assert_eq!(p.parse("D", b"042").unwrap().integer("n").unwrap(), 42);
        let err = p.parse("D", b"0x2").unwrap_err();
        assert_eq!(
            err.violation(),
            Some(&Violation::InvalidDigit { position: 1, byte: b'x' })
        );
    }

    #[test]
    fn boolean_rejects_other_codes() {
        let p = parser(vec![MessageType::new("B").field(F::boolean("b", 2))]);
        assert!(p.parse("B", &[0b0100_0000]).unwrap().boolean("b").unwrap());
        let err = p.parse("B", &[0b1000_0000]).unwrap_err();
        assert_eq!(err.violation(), Some(&Violation::InvalidBoolean { code: 2 }));
    }

    #[test]
    fn sized_nested_must_fill_window() {
        let inner = MessageType::new("Inner").field(F::integer("x", 8));
        let outer = MessageType::new("Outer")
            .field(F::integer("len", 8))
            .field(F::message("inner", "Inner").sized(SizeSpec::bytes_of("len")));
        let p = parser(vec![inner, outer]);
        assert_eq!(p.parse("Outer", &[1, 7]).unwrap().integer("inner.x").unwrap(), 7);
        let err = p.parse("Outer", &[2, 7, 8]).unwrap_err();
        assert_eq!(err.path, "inner");
        assert_eq!(
            err.violation(),
            Some(&Violation::SizeMismatch { declared: 16, consumed: 8 })
        );
    }

    #[test]
    fn window_larger_than_data_is_out_of_data() {
        let inner = MessageType::new("Inner").field(F::octets("rest", SizeSpec::Remainder));
        let outer = MessageType::new("Outer")
            .field(F::integer("len", 8))
            .field(F::message("inner", "Inner").sized(SizeSpec::bytes_of("len")));
        let p = parser(vec![inner, outer]);
        let err = p.parse("Outer", &[5, 1, 2]).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::OutOfData { .. }));
    }

    #[test]
    fn zero_progress_link_hits_depth_limit() {
        let t = MessageType::new("Loop").field(F::next("again", "Loop").when(Predicate::True));
        let p = Parser::with_config(
            Arc::new(Schema::new(vec![t]).unwrap()),
            ParserConfig::default().max_depth(8),
        );
        let err = p.parse("Loop", &[0]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::DepthExceeded { limit: 8 });
    }

    #[test]
    fn non_tail_recursion_is_bounded() {
        let t = MessageType::new("Nest")
            .field(F::boolean("deeper", 8))
            .field(F::message("inner", "Nest").when(Predicate::field_eq("deeper", 1)))
            .field(F::integer("tail", 8));
        let p = Parser::with_config(
            Arc::new(Schema::new(vec![t]).unwrap()),
            ParserConfig::default().max_depth(3),
        );
        assert!(p.parse("Nest", &[1, 1, 0, 9, 9, 9]).is_ok());
        let err = p.parse("Nest", &[1, 1, 1, 0, 9, 9, 9, 9]).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::DepthExceeded { limit: 3 });
        assert_eq!(err.path, "inner.inner.inner");
    }

    #[test]
    fn trailing_data_policy() {
        let t = MessageType::new("One").field(F::integer("x", 8));
        let schema = Arc::new(Schema::new(vec![t]).unwrap());
        let lenient = Parser::new(schema.clone());
        assert_eq!(lenient.parse("One", &[1, 2]).unwrap().size_bits(), 8);
        let strict = Parser::with_config(schema, ParserConfig::default().reject_trailing_data(true));
        assert_eq!(
            strict.parse("One", &[1, 2]).unwrap_err().kind,
            ParseErrorKind::TrailingData { bits: 8 }
        );
    }

    #[test]
    fn dynamic_size_must_be_non_negative() {
        use crate::constraint::Expr;
        let t = MessageType::new("Neg")
            .field(F::integer("len", 8))
            .field(F::octets(
                "data",
                SizeSpec::Dynamic {
                    expr: Expr::field("len").sub(Expr::lit(2)),
                    unit: crate::schema::Unit::Bytes,
                },
            ));
        let p = parser(vec![t]);
        let err = p.parse("Neg", &[1]).unwrap_err();
        assert_eq!(err.path, "data");
        assert!(matches!(err.kind, ParseErrorKind::Evaluation(_)));
    }
}
