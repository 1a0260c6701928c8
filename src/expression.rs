//! Deferred field references and binary predicate expressions.
//!
//! A [`Field`] names a path inside an item without being bound to one. Comparison builders on a
//! field do not compare anything; they return an [`Expression`] that can later be evaluated
//! against any number of items with [`Item::eval`].
//!
//! ```rust
//! use item_pipeline::expression::field;
//! use item_pipeline::types::Item;
//! use serde_json::json;
//!
//! let item = Item::from_value(json!({"name": "Jeff", "job": "developer"})).unwrap();
//! assert!(item.eval(&field("name").equals("Jeff")));
//! assert!(item.eval(&field("job").is_in(vec!["doctor", "dentist", "developer"])));
//! assert!(!item.eval(&field("age").gt(30)));
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::path::{self, PathLike, Segment};
use crate::types::Item;

/// Build a [`Field`] from a path string such as `users[0].address.city`.
pub fn field(path: &str) -> Field {
    Field::new(path)
}

/// A deferred reference to a path inside an item.
///
/// Two fields are equal when their parsed segments are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    segments: Vec<Segment>,
}

impl Field {
    pub fn new(path: &str) -> Self {
        Self {
            segments: path::split(path),
        }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Extend the path with an object key (`field("job").key("title")` is `job.title`).
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }

    /// Extend the path with a list index (`field("friends").index(0)` is `friends[0]`).
    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// The final key, if the path ends in one.
    pub fn name(&self) -> Option<&str> {
        match self.segments.last() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Rename the field in place by replacing its last segment.
    pub fn replace_last(&mut self, segment: impl Into<Segment>) {
        match self.segments.last_mut() {
            Some(last) => *last = segment.into(),
            None => self.segments.push(segment.into()),
        }
    }

    /// Copy of this field with the last segment replaced.
    pub fn with_last(&self, segment: impl Into<Segment>) -> Self {
        let mut out = self.clone();
        out.replace_last(segment);
        out
    }

    pub fn path(&self) -> String {
        path::join(&self.segments)
    }

    pub fn equals(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::Eq, right)
    }

    pub fn not_equals(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::Ne, right)
    }

    pub fn lt(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::Lt, right)
    }

    pub fn lte(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::Lte, right)
    }

    pub fn gt(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::Gt, right)
    }

    pub fn gte(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::Gte, right)
    }

    pub fn is_in(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::In, right)
    }

    pub fn not_in(&self, right: impl Into<Operand>) -> Expression {
        Expression::new(self.clone(), Op::NotIn, right)
    }
}

impl PathLike for Field {
    fn segments(&self) -> Cow<'_, [Segment]> {
        Cow::Borrowed(&self.segments)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Binary operators supported by [`Expression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

impl Op {
    pub const ALL: [Op; 8] = [
        Op::Eq,
        Op::Ne,
        Op::Lt,
        Op::Lte,
        Op::Gt,
        Op::Gte,
        Op::In,
        Op::NotIn,
    ];

    /// Upper-case name used in configuration (`EQ`, `NOT_IN`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Lte => "LTE",
            Op::Gt => "GT",
            Op::Gte => "GTE",
            Op::In => "IN",
            Op::NotIn => "NOT_IN",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::In => "in",
            Op::NotIn => "not in",
        }
    }

    /// Apply the operator to two resolved operands.
    pub fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            Op::Eq => loose_eq(left, right),
            Op::Ne => !loose_eq(left, right),
            Op::Lt => ordered(left, right, |o| o == Ordering::Less),
            Op::Lte => ordered(left, right, |o| o != Ordering::Greater),
            Op::Gt => ordered(left, right, |o| o == Ordering::Greater),
            Op::Gte => ordered(left, right, |o| o != Ordering::Less),
            Op::In => contains(right, left).unwrap_or(false),
            Op::NotIn => !contains(right, left).unwrap_or(false),
        }
    }
}

impl FromStr for Op {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Op::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| PipelineError::config(format!("invalid expression operator '{s}'")))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One side of an [`Expression`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Field(Field),
}

impl Operand {
    /// Resolve against an item: fields read their current value (missing → `null`).
    pub fn resolve<'a>(&'a self, item: &'a Item) -> Cow<'a, Value> {
        match self {
            Operand::Literal(v) => Cow::Borrowed(v),
            Operand::Field(f) => match item.get(f) {
                Some(v) => Cow::Borrowed(v),
                None => Cow::Owned(Value::Null),
            },
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "{v}"),
            Operand::Field(field) => write!(f, "{field}"),
        }
    }
}

impl From<Field> for Operand {
    fn from(field: Field) -> Self {
        Operand::Field(field)
    }
}

impl From<&Field> for Operand {
    fn from(field: &Field) -> Self {
        Operand::Field(field.clone())
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Literal(Value::from(value))
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Literal(Value::from(value))
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Literal(Value::from(value))
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Literal(Value::from(value))
    }
}

impl From<u64> for Operand {
    fn from(value: u64) -> Self {
        Operand::Literal(Value::from(value))
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Literal(Value::from(value))
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Literal(Value::from(value))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::Literal(Value::Array(values.into_iter().map(Into::into).collect()))
    }
}

/// An immutable `left op right` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub left: Operand,
    pub op: Op,
    pub right: Operand,
}

impl Expression {
    pub fn new(left: impl Into<Operand>, op: Op, right: impl Into<Operand>) -> Self {
        Self {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    /// Build an expression from a configured operator name such as `"NOT_IN"`.
    pub fn parse(left: impl Into<Operand>, op: &str, right: impl Into<Operand>) -> PipelineResult<Self> {
        Ok(Self::new(left, op.parse()?, right))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

impl Item {
    /// Evaluate `expression` against this item. Never mutates the item.
    pub fn eval(&self, expression: &Expression) -> bool {
        let left = expression.left.resolve(self);
        let right = expression.right.resolve(self);
        expression.op.apply(&left, &right)
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn ordered(left: &Value, right: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match compare(left, right) {
        Some(ordering) => accept(ordering),
        None => {
            debug!(%left, %right, "operands are not comparable; expression is false");
            false
        }
    }
}

/// Membership of `needle` in `haystack`, or `None` if the pair has no notion of membership.
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match (haystack, needle) {
        (Value::Array(values), _) => Some(values.iter().any(|v| loose_eq(v, needle))),
        (Value::Object(map), Value::String(key)) => Some(map.contains_key(key)),
        (Value::String(s), Value::String(sub)) => Some(s.contains(sub.as_str())),
        _ => None,
    }
}
