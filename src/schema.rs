//! Field descriptor graph: message types, field descriptors and the validated [`Schema`].
//!
//! A schema arrives already reduced to descriptors, either assembled with the builder
//! methods below or loaded from JSON with [`Schema::from_json`]. Construction checks every
//! cross-reference once; afterwards the schema is immutable and can be shared between
//! threads behind an `Arc`.

use crate::constraint::{Expr, Predicate};
use crate::error::{ParseErrorKind, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Widest integer a single field can hold.
pub const MAX_INTEGER_BITS: u64 = 64;
/// Most digits that always fit a `u64`.
pub const MAX_DECIMAL_DIGITS: u64 = 19;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageType {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub size: SizeSpec,
    #[serde(default)]
    pub constraints: Vec<Predicate>,
    #[serde(default)]
    pub condition: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumCase {
    pub code: u64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Boolean,
    Enumerated(Vec<EnumCase>),
    /// Unused-bit count octet followed by data octets; the size covers both.
    BitString,
    Octets,
    /// ASCII decimal digits, one per octet.
    Decimal,
    Message(String),
    /// Link to the next node of a chain.
    Next(String),
    Marker,
}

impl FieldKind {
    pub fn is_nested(&self) -> bool {
        matches!(self, FieldKind::Message(_) | FieldKind::Next(_))
    }

    /// Kinds decoded as whole octets.
    fn is_octet_based(&self) -> bool {
        matches!(self, FieldKind::BitString | FieldKind::Octets | FieldKind::Decimal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Bits,
    Bytes,
}

impl Unit {
    pub fn bits_per_unit(self) -> u64 {
        match self {
            Unit::Bits => 1,
            Unit::Bytes => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeSpec {
    /// No size: nested messages take what they parse, markers take nothing.
    #[default]
    Implicit,
    Bits(u64),
    Bytes(u64),
    /// Computed from earlier fields.
    Dynamic { expr: Expr, unit: Unit },
    /// Everything left in the enclosing scope.
    Remainder,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, size: SizeSpec) -> Self {
        FieldDescriptor {
            name: name.into(),
            kind,
            size,
            constraints: Vec::new(),
            condition: None,
        }
    }

    pub fn integer(name: impl Into<String>, bits: u64) -> Self {
        Self::new(name, FieldKind::Integer, SizeSpec::Bits(bits))
    }

    pub fn boolean(name: impl Into<String>, bits: u64) -> Self {
        Self::new(name, FieldKind::Boolean, SizeSpec::Bits(bits))
    }

    pub fn enumerated<L: Into<String>>(
        name: impl Into<String>,
        bits: u64,
        cases: impl IntoIterator<Item = (u64, L)>,
    ) -> Self {
        let cases = cases
            .into_iter()
            .map(|(code, label)| EnumCase { code, label: label.into() })
            .collect();
        Self::new(name, FieldKind::Enumerated(cases), SizeSpec::Bits(bits))
    }

    pub fn decimal(name: impl Into<String>, digits: u64) -> Self {
        Self::new(name, FieldKind::Decimal, SizeSpec::Bytes(digits))
    }

    pub fn octets(name: impl Into<String>, size: SizeSpec) -> Self {
        Self::new(name, FieldKind::Octets, size)
    }

    pub fn bit_string(name: impl Into<String>, size: SizeSpec) -> Self {
        Self::new(name, FieldKind::BitString, size)
    }

    pub fn message(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Message(type_name.into()), SizeSpec::Implicit)
    }

    pub fn next(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Next(type_name.into()), SizeSpec::Implicit)
    }

    pub fn marker(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Marker, SizeSpec::Implicit)
    }

    pub fn sized(mut self, size: SizeSpec) -> Self {
        self.size = size;
        self
    }

    pub fn constraint(mut self, p: Predicate) -> Self {
        self.constraints.push(p);
        self
    }

    pub fn when(mut self, p: Predicate) -> Self {
        self.condition = Some(p);
        self
    }

    fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let SizeSpec::Dynamic { expr, .. } = &self.size {
            expr.references(&mut out);
        }
        for c in &self.constraints {
            c.references(&mut out);
        }
        if let Some(c) = &self.condition {
            c.references(&mut out);
        }
        out
    }
}

impl SizeSpec {
    pub fn bytes_of(path: impl Into<String>) -> Self {
        SizeSpec::Dynamic {
            expr: Expr::field(path),
            unit: Unit::Bytes,
        }
    }

    pub fn bits_of(path: impl Into<String>) -> Self {
        SizeSpec::Dynamic {
            expr: Expr::field(path),
            unit: Unit::Bits,
        }
    }

    /// Statically known width in bits, if any.
    pub fn literal_bits(&self) -> Option<u64> {
        match self {
            SizeSpec::Bits(n) => Some(*n),
            SizeSpec::Bytes(n) => n.checked_mul(8),
            _ => None,
        }
    }
}

impl MessageType {
    pub fn new(name: impl Into<String>) -> Self {
        MessageType {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, f: FieldDescriptor) -> Self {
        self.fields.push(f);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Validated, immutable set of message types.
#[derive(Debug, Clone)]
pub struct Schema {
    types: Vec<MessageType>,
    by_name: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct SchemaDocument {
    types: Vec<MessageType>,
}

impl Schema {
    pub fn new(types: Vec<MessageType>) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::new();
        for (i, t) in types.iter().enumerate() {
            if by_name.insert(t.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateType(t.name.clone()));
            }
        }
        let schema = Schema { types, by_name };
        for t in &schema.types {
            schema.check_type(t)?;
        }
        Ok(schema)
    }

    /// Load from `{"types": [...]}`.
    pub fn from_json(src: &str) -> Result<Self, SchemaError> {
        let doc: SchemaDocument = serde_json::from_str(src)?;
        Schema::new(doc.types)
    }

    pub fn get(&self, name: &str) -> Option<&MessageType> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    pub fn resolve(&self, name: &str) -> Result<&MessageType, ParseErrorKind> {
        self.get(name)
            .ok_or_else(|| ParseErrorKind::UnknownType(name.to_string()))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name.as_str())
    }

    pub fn types(&self) -> &[MessageType] {
        &self.types
    }

    fn check_type(&self, t: &MessageType) -> Result<(), SchemaError> {
        let mut earlier: HashMap<&str, &FieldDescriptor> = HashMap::new();
        for f in &t.fields {
            let invalid = |reason: &str| SchemaError::InvalidField {
                type_name: t.name.clone(),
                field: f.name.clone(),
                reason: reason.to_string(),
            };
            if f.name.is_empty() || f.name.contains('.') {
                return Err(invalid("field names must be non-empty and contain no `.`"));
            }
            if earlier.contains_key(f.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    type_name: t.name.clone(),
                    field: f.name.clone(),
                });
            }
            for reference in f.references() {
                let mut parts = reference.splitn(2, '.');
                let head = parts.next().unwrap_or_default();
                let ok = match (earlier.get(head), parts.next()) {
                    (Some(_), None) => true,
                    (Some(field), Some(tail)) => self.resolves(field, tail),
                    (None, _) => false,
                };
                if !ok {
                    return Err(SchemaError::UnknownReference {
                        type_name: t.name.clone(),
                        field: f.name.clone(),
                        reference,
                    });
                }
            }
            if let Some(c) = &f.condition {
                if c.uses_value() {
                    return Err(invalid("a condition cannot read the field's own value"));
                }
            }
            match &f.kind {
                FieldKind::Message(target) | FieldKind::Next(target) => {
                    if self.get(target).is_none() {
                        return Err(SchemaError::UnknownType {
                            type_name: t.name.clone(),
                            field: f.name.clone(),
                            target: target.clone(),
                        });
                    }
                    if !f.constraints.is_empty() {
                        return Err(invalid("nested messages cannot carry constraints"));
                    }
                }
                FieldKind::Marker => {
                    if f.size != SizeSpec::Implicit {
                        return Err(self.size_error(t, f, "markers have no size"));
                    }
                    if f.constraints.iter().any(Predicate::uses_value) {
                        return Err(invalid("markers have no value to constrain"));
                    }
                }
                FieldKind::Enumerated(cases) => {
                    let mut seen = std::collections::HashSet::new();
                    if cases.iter().any(|c| !seen.insert(c.code)) {
                        return Err(invalid("duplicate enumeration code"));
                    }
                }
                _ => {}
            }
            self.check_size(t, f)?;
            earlier.insert(f.name.as_str(), f);
        }
        Ok(())
    }

    /// Whether the dotted `tail` names a field reachable through the nested `field`.
    fn resolves(&self, field: &FieldDescriptor, tail: &str) -> bool {
        let mut at = field;
        for segment in tail.split('.') {
            let target = match &at.kind {
                FieldKind::Message(target) | FieldKind::Next(target) => target,
                _ => return false,
            };
            match self.get(target).and_then(|t| t.get_field(segment)) {
                Some(f) => at = f,
                None => return false,
            }
        }
        true
    }

    fn size_error(&self, t: &MessageType, f: &FieldDescriptor, reason: &str) -> SchemaError {
        SchemaError::InvalidSize {
            type_name: t.name.clone(),
            field: f.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn check_size(&self, t: &MessageType, f: &FieldDescriptor) -> Result<(), SchemaError> {
        if f.kind.is_nested() || f.kind == FieldKind::Marker {
            return Ok(());
        }
        if f.size == SizeSpec::Implicit {
            return Err(self.size_error(t, f, "this kind needs a size"));
        }
        let Some(bits) = f.size.literal_bits() else {
            return Ok(());
        };
        match &f.kind {
            FieldKind::Integer | FieldKind::Boolean | FieldKind::Enumerated(_) => {
                if bits == 0 || bits > MAX_INTEGER_BITS {
                    return Err(self.size_error(t, f, "integer widths must be 1..=64 bits"));
                }
            }
            k if k.is_octet_based() => {
                if bits % 8 != 0 {
                    return Err(self.size_error(t, f, "size must be a whole number of octets"));
                }
                if *k == FieldKind::BitString && bits == 0 {
                    return Err(self.size_error(t, f, "a bit string needs its unused-bits octet"));
                }
                if *k == FieldKind::Decimal && (bits == 0 || bits / 8 > MAX_DECIMAL_DIGITS) {
                    return Err(self.size_error(t, f, "decimal fields hold 1..=19 digits"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}
