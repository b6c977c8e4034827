//! Text dump of a parsed [`FieldTree`]: one line per field, nested messages indented,
//! byte values in hex and enumerated values by label.
//!
//! Chain links are flattened: the successor's fields continue at the same indentation after
//! a `name -> Type` line, so long chains do not drift to the right.

use crate::value::{FieldTree, RecordId, Value};

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// One-line rendering of a scalar value. Records render as their type name.
pub fn value_summary(tree: &FieldTree, v: &Value) -> String {
    match v {
        Value::Integer(x) => format!("{}", x),
        Value::Boolean(b) => format!("{}", b),
        Value::Enum { code, label } => format!("{} ({})", label, code),
        Value::Bytes(b) if b.is_empty() => "hex()".to_string(),
        Value::Bytes(b) => format!("hex({})", hex_string(b)),
        Value::Bits { bytes, unused } => format!("bits({}; unused {})", hex_string(bytes), unused),
        Value::Record(id) => tree
            .records
            .get(id.0)
            .map(|r| r.type_name.clone())
            .unwrap_or_default(),
    }
}

enum Item<'t> {
    Record { id: RecordId, indent: usize },
    Line(String),
    Field { name: &'t str, value: &'t Value, indent: usize, link: bool },
}

/// Multi-line dump of the whole tree, root first.
pub fn dump(tree: &FieldTree) -> String {
    let mut lines = vec![tree.type_name().to_string()];
    let mut work = vec![Item::Record { id: RecordId(0), indent: 1 }];
    while let Some(item) = work.pop() {
        match item {
            Item::Line(l) => lines.push(l),
            Item::Record { id, indent } => {
                let Some(record) = tree.records.get(id.0) else {
                    continue;
                };
                // Reversed so the first field is popped first.
                for (name, value) in record.fields.iter().rev() {
                    let link = matches!(value, Value::Record(r) if record.next == Some(*r));
                    work.push(Item::Field { name: name.as_str(), value, indent, link });
                }
            }
            Item::Field { name, value, indent, link } => {
                let pad = "  ".repeat(indent);
                match value {
                    Value::Record(id) if link => {
                        lines.push(format!("{}{} -> {}", pad, name, value_summary(tree, value)));
                        work.push(Item::Record { id: *id, indent });
                    }
                    Value::Record(id) => {
                        lines.push(format!("{}{}: {} {{", pad, name, value_summary(tree, value)));
                        work.push(Item::Line(format!("{}}}", pad)));
                        work.push(Item::Record { id: *id, indent: indent + 1 });
                    }
                    _ => lines.push(format!("{}{}: {}", pad, name, value_summary(tree, value))),
                }
            }
        }
    }
    lines.join("\n")
}
