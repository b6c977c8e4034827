//! Expressions and predicates over the field being decoded and its earlier siblings.
//!
//! Used for value constraints, presence conditions and dynamic sizes. Arithmetic is done in
//! `i128` with checked operations. Field references are dotted paths resolved against the
//! record under construction; only fields bound before the current one are visible.

use crate::error::EvalError;
use crate::value::{lookup, Record, RecordId, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// The value of the field being validated.
    Value,
    Lit(i64),
    /// Previously bound field, by dotted path.
    Field(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    Cond {
        when: Box<Predicate>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    True,
    Cmp { op: CmpOp, lhs: Expr, rhs: Expr },
    /// Inclusive range.
    InRange { expr: Expr, min: i64, max: i64 },
    OneOf { expr: Expr, values: Vec<i64> },
    /// The field at `path` has been bound (not skipped by its condition).
    Present(String),
    /// The enumerated field at `path` carries `label`.
    Is { path: String, label: String },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

/// What an expression can see: the current value (absent for markers) and the siblings
/// bound so far.
pub struct Env<'r> {
    records: &'r [Record],
    scope: RecordId,
    current: Option<&'r Value>,
}

impl<'r> Env<'r> {
    pub(crate) fn new(records: &'r [Record], scope: RecordId, current: Option<&'r Value>) -> Self {
        Env { records, scope, current }
    }

    fn field(&self, path: &str) -> Result<&'r Value, EvalError> {
        lookup(self.records, self.scope, path).ok_or_else(|| EvalError::Unbound(path.to_string()))
    }
}

fn numeric(path: &str, v: &Value) -> Result<i128, EvalError> {
    v.as_number().map(i128::from).ok_or_else(|| EvalError::NotNumeric {
        path: path.to_string(),
        found: v.kind_name(),
    })
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Expr::Field(path.into())
    }

    pub fn lit(v: i64) -> Self {
        Expr::Lit(v)
    }

    pub fn add(self, rhs: Expr) -> Self {
        Expr::Add(Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn mul(self, rhs: Expr) -> Self {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }

    pub fn div(self, rhs: Expr) -> Self {
        Expr::Div(Box::new(self), Box::new(rhs))
    }

    pub fn rem(self, rhs: Expr) -> Self {
        Expr::Mod(Box::new(self), Box::new(rhs))
    }

    pub fn cond(when: Predicate, then: Expr, otherwise: Expr) -> Self {
        Expr::Cond {
            when: Box::new(when),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn eval(&self, env: &Env<'_>) -> Result<i128, EvalError> {
        match self {
            Expr::Value => {
                let v = env.current.ok_or(EvalError::NoValue)?;
                numeric("value", v)
            }
            Expr::Lit(n) => Ok(*n as i128),
            Expr::Field(path) => numeric(path, env.field(path)?),
            Expr::Add(a, b) => a.eval(env)?.checked_add(b.eval(env)?).ok_or(EvalError::Overflow),
            Expr::Sub(a, b) => a.eval(env)?.checked_sub(b.eval(env)?).ok_or(EvalError::Overflow),
            Expr::Mul(a, b) => a.eval(env)?.checked_mul(b.eval(env)?).ok_or(EvalError::Overflow),
            Expr::Div(a, b) => {
                let d = b.eval(env)?;
                if d == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                a.eval(env)?.checked_div(d).ok_or(EvalError::Overflow)
            }
            Expr::Mod(a, b) => {
                let d = b.eval(env)?;
                if d == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                a.eval(env)?.checked_rem(d).ok_or(EvalError::Overflow)
            }
            Expr::Cond { when, then, otherwise } => {
                if when.eval(env)? {
                    then.eval(env)
                } else {
                    otherwise.eval(env)
                }
            }
        }
    }

    /// Field paths this expression reads.
    pub fn references(&self, out: &mut Vec<String>) {
        match self {
            Expr::Value | Expr::Lit(_) => {}
            Expr::Field(p) => out.push(p.clone()),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) | Expr::Mod(a, b) => {
                a.references(out);
                b.references(out);
            }
            Expr::Cond { when, then, otherwise } => {
                when.references(out);
                then.references(out);
                otherwise.references(out);
            }
        }
    }

    fn uses_value(&self) -> bool {
        match self {
            Expr::Value => true,
            Expr::Lit(_) | Expr::Field(_) => false,
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) | Expr::Mod(a, b) => {
                a.uses_value() || b.uses_value()
            }
            Expr::Cond { when, then, otherwise } => {
                when.uses_value() || then.uses_value() || otherwise.uses_value()
            }
        }
    }
}

impl Predicate {
    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Predicate::Cmp { op, lhs, rhs }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Predicate::cmp(CmpOp::Eq, lhs, rhs)
    }

    /// `field == literal`, the usual presence gate.
    pub fn field_eq(path: impl Into<String>, v: i64) -> Self {
        Predicate::eq(Expr::field(path), Expr::lit(v))
    }

    /// `value == literal`.
    pub fn value_eq(v: i64) -> Self {
        Predicate::eq(Expr::Value, Expr::lit(v))
    }

    pub fn range(expr: Expr, min: i64, max: i64) -> Self {
        Predicate::InRange { expr, min, max }
    }

    /// `value in min..=max`.
    pub fn value_in(min: i64, max: i64) -> Self {
        Predicate::range(Expr::Value, min, max)
    }

    pub fn one_of(expr: Expr, values: impl Into<Vec<i64>>) -> Self {
        Predicate::OneOf {
            expr,
            values: values.into(),
        }
    }

    pub fn is(path: impl Into<String>, label: impl Into<String>) -> Self {
        Predicate::Is {
            path: path.into(),
            label: label.into(),
        }
    }

    pub fn present(path: impl Into<String>) -> Self {
        Predicate::Present(path.into())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut v) => {
                v.push(other);
                Predicate::And(v)
            }
            p => Predicate::And(vec![p, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut v) => {
                v.push(other);
                Predicate::Or(v)
            }
            p => Predicate::Or(vec![p, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Conjunctions and disjunctions short-circuit left to right.
    pub fn eval(&self, env: &Env<'_>) -> Result<bool, EvalError> {
        Ok(match self {
            Predicate::True => true,
            Predicate::Cmp { op, lhs, rhs } => {
                let (a, b) = (lhs.eval(env)?, rhs.eval(env)?);
                match op {
                    CmpOp::Eq => a == b,
                    CmpOp::Ne => a != b,
                    CmpOp::Lt => a < b,
                    CmpOp::Le => a <= b,
                    CmpOp::Gt => a > b,
                    CmpOp::Ge => a >= b,
                }
            }
            Predicate::InRange { expr, min, max } => {
                let v = expr.eval(env)?;
                (*min as i128..=*max as i128).contains(&v)
            }
            Predicate::OneOf { expr, values } => {
                let v = expr.eval(env)?;
                values.iter().any(|x| *x as i128 == v)
            }
            Predicate::Present(path) => lookup(env.records, env.scope, path).is_some(),
            Predicate::Is { path, label } => match env.field(path)? {
                Value::Enum { label: l, .. } => l == label,
                other => {
                    return Err(EvalError::NotEnumerated {
                        path: path.clone(),
                        found: other.kind_name(),
                    })
                }
            },
            Predicate::And(ps) => {
                for p in ps {
                    if !p.eval(env)? {
                        return Ok(false);
                    }
                }
                true
            }
            Predicate::Or(ps) => {
                for p in ps {
                    if p.eval(env)? {
                        return Ok(true);
                    }
                }
                false
            }
            Predicate::Not(p) => !p.eval(env)?,
        })
    }

    pub fn references(&self, out: &mut Vec<String>) {
        match self {
            Predicate::True => {}
            Predicate::Cmp { lhs, rhs, .. } => {
                lhs.references(out);
                rhs.references(out);
            }
            Predicate::InRange { expr, .. } | Predicate::OneOf { expr, .. } => expr.references(out),
            Predicate::Present(p) | Predicate::Is { path: p, .. } => out.push(p.clone()),
            Predicate::And(ps) | Predicate::Or(ps) => ps.iter().for_each(|p| p.references(out)),
            Predicate::Not(p) => p.references(out),
        }
    }

    /// Whether the predicate reads the current field's value (not allowed in conditions).
    pub fn uses_value(&self) -> bool {
        match self {
            Predicate::True | Predicate::Present(_) | Predicate::Is { .. } => false,
            Predicate::Cmp { lhs, rhs, .. } => lhs.uses_value() || rhs.uses_value(),
            Predicate::InRange { expr, .. } | Predicate::OneOf { expr, .. } => expr.uses_value(),
            Predicate::And(ps) | Predicate::Or(ps) => ps.iter().any(Predicate::uses_value),
            Predicate::Not(p) => p.uses_value(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Value => f.write_str("value"),
            Expr::Lit(n) => write!(f, "{}", n),
            Expr::Field(p) => f.write_str(p),
            Expr::Add(a, b) => write!(f, "({} + {})", a, b),
            Expr::Sub(a, b) => write!(f, "({} - {})", a, b),
            Expr::Mul(a, b) => write!(f, "{} * {}", a, b),
            Expr::Div(a, b) => write!(f, "{} / {}", a, b),
            Expr::Mod(a, b) => write!(f, "{} mod {}", a, b),
            Expr::Cond { when, then, otherwise } => {
                write!(f, "(if {} then {} else {})", when, then, otherwise)
            }
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "/=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, ps: &[Predicate], sep: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, p) in ps.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{}", p)?;
            }
            f.write_str(")")
        }
        match self {
            Predicate::True => f.write_str("true"),
            Predicate::Cmp { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Predicate::InRange { expr, min, max } => write!(f, "{} in {}..={}", expr, min, max),
            Predicate::OneOf { expr, values } => {
                let vs: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} in {{{}}}", expr, vs.join(", "))
            }
            Predicate::Present(p) => write!(f, "present({})", p),
            Predicate::Is { path, label } => write!(f, "{} = {}", path, label),
            Predicate::And(ps) => join(f, ps, " and "),
            Predicate::Or(ps) => join(f, ps, " or "),
            Predicate::Not(p) => write!(f, "not {}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, Value)]) -> Vec<Record> {
        let mut r = Record::new("T");
        for (n, v) in fields {
            r.bind(n, v.clone());
        }
        vec![r]
    }

    #[test]
    fn range_on_current_value() {
        let records = record(&[]);
        let month = Value::Integer(13);
        let env = Env::new(&records, RecordId(0), Some(&month));
        assert!(!Predicate::value_in(1, 12).eval(&env).unwrap());
        let month = Value::Integer(12);
        let env = Env::new(&records, RecordId(0), Some(&month));
        assert!(Predicate::value_in(1, 12).eval(&env).unwrap());
    }

    #[test]
    fn sibling_reference_and_arithmetic() {
        let records = record(&[("hi", Value::Integer(0x31)), ("lo", Value::Integer(0x32))]);
        let env = Env::new(&records, RecordId(0), None);
        let composed = Expr::field("hi")
            .sub(Expr::lit(0x30))
            .mul(Expr::lit(10))
            .add(Expr::field("lo").sub(Expr::lit(0x30)));
        assert_eq!(composed.eval(&env).unwrap(), 12);
    }

    #[test]
    fn boolean_and_enum_project_to_numbers() {
        let records = record(&[
            ("more", Value::Boolean(true)),
            ("class", Value::Enum { code: 2, label: "Context_Specific".into() }),
        ]);
        let env = Env::new(&records, RecordId(0), None);
        assert!(Predicate::field_eq("more", 1).eval(&env).unwrap());
        assert!(Predicate::field_eq("class", 2).eval(&env).unwrap());
        assert!(Predicate::is("class", "Context_Specific").eval(&env).unwrap());
    }

    #[test]
    fn unbound_and_non_numeric_references() {
        let records = record(&[("data", Value::Bytes(vec![1]))]);
        let env = Env::new(&records, RecordId(0), None);
        assert_eq!(
            Predicate::field_eq("missing", 1).eval(&env).unwrap_err(),
            EvalError::Unbound("missing".into())
        );
        assert!(matches!(
            Predicate::field_eq("data", 1).eval(&env).unwrap_err(),
            EvalError::NotNumeric { .. }
        ));
        assert_eq!(Predicate::value_eq(1).eval(&env).unwrap_err(), EvalError::NoValue);
    }

    #[test]
    fn short_circuit_guards_unbound() {
        let records = record(&[("long", Value::Boolean(false))]);
        let env = Env::new(&records, RecordId(0), None);
        let p = Predicate::field_eq("long", 1).and(Predicate::field_eq("octets", 2));
        assert!(!p.eval(&env).unwrap());
        assert!(Predicate::present("long").eval(&env).unwrap());
        assert!(!Predicate::present("octets").eval(&env).unwrap());
    }

    #[test]
    fn cond_selects_branch() {
        let records = record(&[("long", Value::Boolean(true)), ("long_value", Value::Integer(300))]);
        let env = Env::new(&records, RecordId(0), None);
        let e = Expr::cond(
            Predicate::field_eq("long", 1),
            Expr::field("long_value"),
            Expr::field("short_value"),
        );
        assert_eq!(e.eval(&env).unwrap(), 300);
    }

    #[test]
    fn division_by_zero() {
        let records = record(&[]);
        let env = Env::new(&records, RecordId(0), None);
        assert_eq!(
            Expr::lit(1).div(Expr::lit(0)).eval(&env).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn display_reads_naturally() {
        assert_eq!(Predicate::value_in(1, 12).to_string(), "value in 1..=12");
        assert_eq!(
            Predicate::field_eq("more", 1).negate().to_string(),
            "not more = 1"
        );
    }

    #[test]
    fn references_are_collected() {
        let mut refs = Vec::new();
        Predicate::field_eq("a", 1)
            .and(Predicate::range(Expr::field("b.c"), 0, 1))
            .references(&mut refs);
        assert_eq!(refs, vec!["a".to_string(), "b.c".to_string()]);
    }
}
