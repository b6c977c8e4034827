//! Parsed output: an arena of records addressed by [`RecordId`], with typed accessors.
//!
//! Nested messages and chain links are stored as separate records and referenced by index,
//! so a long chain is a flat vector rather than a deeply nested structure. Paths are dotted:
//! `time.month` looks up `month` in the record bound to the field `time`.

use crate::error::AccessError;
use std::fmt;

/// Index of a record inside its [`FieldTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub(crate) usize);

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(u64),
    Boolean(bool),
    Enum { code: u64, label: String },
    Bytes(Vec<u8>),
    /// Bit string: data octets plus the number of unused bits in the last octet.
    Bits { bytes: Vec<u8>, unused: u8 },
    /// Nested message or chain link.
    Record(RecordId),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Enum { .. } => "enumerated value",
            Value::Bytes(_) => "byte sequence",
            Value::Bits { .. } => "bit string",
            Value::Record(_) => "message",
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(x) => Some(*x),
            _ => None,
        }
    }

    /// Numeric view used by the constraint evaluator: integers, booleans (0/1), enum codes.
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Value::Integer(x) => Some(*x),
            Value::Boolean(b) => Some(*b as u64),
            Value::Enum { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Borrowed view of a bit-string value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitString<'t> {
    pub bytes: &'t [u8],
    pub unused: u8,
}

impl BitString<'_> {
    /// Number of meaningful bits: all data bits minus the unused tail of the last octet.
    pub fn significant_bits(&self) -> usize {
        (self.bytes.len() * 8).saturating_sub(self.unused as usize)
    }
}

/// One parsed message instance (root, nested message or chain node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub(crate) type_name: String,
    pub(crate) fields: Vec<(String, Value)>,
    pub(crate) next: Option<RecordId>,
}

impl Record {
    pub(crate) fn new(type_name: &str) -> Self {
        Record {
            type_name: type_name.to_string(),
            fields: Vec::new(),
            next: None,
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        self.fields.push((name.to_string(), value));
    }
}

/// Resolve a dotted path starting at `start`, descending through bound records.
pub(crate) fn lookup<'r>(records: &'r [Record], start: RecordId, path: &str) -> Option<&'r Value> {
    let mut record = records.get(start.0)?;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = record.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        match value {
            Value::Record(id) => record = records.get(id.0)?,
            _ => return None,
        }
    }
    None
}

/// The validated, queryable result of one parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTree {
    pub(crate) records: Vec<Record>,
    pub(crate) size_bits: u64,
}

impl FieldTree {
    pub(crate) fn new(records: Vec<Record>, size_bits: u64) -> Self {
        FieldTree { records, size_bits }
    }

    pub fn root(&self) -> Fields<'_> {
        Fields { tree: self, id: RecordId(0) }
    }

    pub fn type_name(&self) -> &str {
        &self.records[0].type_name
    }

    /// Bits consumed by the message.
    pub fn size_bits(&self) -> u64 {
        self.size_bits
    }

    /// Number of records (root, nested messages and chain nodes).
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, path: &str) -> Result<&Value, AccessError> {
        self.root().get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.root().contains(path)
    }

    pub fn integer(&self, path: &str) -> Result<u64, AccessError> {
        self.root().integer(path)
    }

    pub fn boolean(&self, path: &str) -> Result<bool, AccessError> {
        self.root().boolean(path)
    }

    pub fn label(&self, path: &str) -> Result<&str, AccessError> {
        self.root().label(path)
    }

    pub fn bytes(&self, path: &str) -> Result<&[u8], AccessError> {
        self.root().bytes(path)
    }

    pub fn bits(&self, path: &str) -> Result<BitString<'_>, AccessError> {
        self.root().bits(path)
    }

    pub fn message(&self, path: &str) -> Result<Fields<'_>, AccessError> {
        self.root().message(path)
    }
}

impl fmt::Display for FieldTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::dump::dump(self))
    }
}

/// View of one record of a [`FieldTree`].
#[derive(Debug, Clone, Copy)]
pub struct Fields<'t> {
    tree: &'t FieldTree,
    id: RecordId,
}

impl<'t> Fields<'t> {
    fn record(&self) -> &'t Record {
        &self.tree.records[self.id.0]
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn type_name(&self) -> &'t str {
        &self.record().type_name
    }

    pub fn len(&self) -> usize {
        self.record().fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record().fields.is_empty()
    }

    /// Bound fields in descriptor order.
    pub fn iter(&self) -> impl Iterator<Item = (&'t str, &'t Value)> + 't {
        self.record().fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn get(&self, path: &str) -> Result<&'t Value, AccessError> {
        lookup(&self.tree.records, self.id, path).ok_or_else(|| AccessError::FieldNotFound {
            path: path.to_string(),
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        lookup(&self.tree.records, self.id, path).is_some()
    }

    pub fn integer(&self, path: &str) -> Result<u64, AccessError> {
        match self.get(path)? {
            Value::Integer(x) => Ok(*x),
            other => Err(wrong_kind(path, "integer", other)),
        }
    }

    pub fn boolean(&self, path: &str) -> Result<bool, AccessError> {
        match self.get(path)? {
            Value::Boolean(b) => Ok(*b),
            other => Err(wrong_kind(path, "boolean", other)),
        }
    }

    pub fn label(&self, path: &str) -> Result<&'t str, AccessError> {
        match self.get(path)? {
            Value::Enum { label, .. } => Ok(label),
            other => Err(wrong_kind(path, "enumerated value", other)),
        }
    }

    pub fn bytes(&self, path: &str) -> Result<&'t [u8], AccessError> {
        match self.get(path)? {
            Value::Bytes(b) => Ok(b),
            other => Err(wrong_kind(path, "byte sequence", other)),
        }
    }

    pub fn bits(&self, path: &str) -> Result<BitString<'t>, AccessError> {
        match self.get(path)? {
            Value::Bits { bytes, unused } => Ok(BitString {
                bytes,
                unused: *unused,
            }),
            other => Err(wrong_kind(path, "bit string", other)),
        }
    }

    pub fn message(&self, path: &str) -> Result<Fields<'t>, AccessError> {
        match self.get(path)? {
            Value::Record(id) => Ok(Fields { tree: self.tree, id: *id }),
            other => Err(wrong_kind(path, "message", other)),
        }
    }

    pub fn has_next(&self) -> bool {
        self.record().next.is_some()
    }

    /// Successor in a linked chain, if the chain continues.
    pub fn next_node(&self) -> Option<Fields<'t>> {
        self.record().next.map(|id| Fields { tree: self.tree, id })
    }

    /// Forward-only traversal of the chain starting at (and including) this record.
    pub fn chain(&self) -> Chain<'t> {
        Chain {
            tree: self.tree,
            next: Some(self.id),
        }
    }
}

fn wrong_kind(path: &str, expected: &'static str, found: &Value) -> AccessError {
    AccessError::WrongKind {
        path: path.to_string(),
        expected,
        found: found.kind_name(),
    }
}

/// Iterator over the nodes of a linked chain, in encounter order.
#[derive(Debug, Clone)]
pub struct Chain<'t> {
    tree: &'t FieldTree,
    next: Option<RecordId>,
}

impl<'t> Iterator for Chain<'t> {
    type Item = Fields<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = Fields { tree: self.tree, id };
        self.next = node.record().next;
        Some(node)
    }
}

impl std::iter::FusedIterator for Chain<'_> {}
