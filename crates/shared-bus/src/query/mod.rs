//! # Query Language
//!
//! Subscribers describe the events they want with a small conjunctive
//! query language evaluated against the tags attached to every published
//! message:
//!
//! ```text
//! qc.event = 'Tx' AND tx.height > 5 AND tx.hash EXISTS
//! ```
//!
//! A [`Query`] is compiled once by [`Query::parse`] and is immutable
//! afterwards. Two queries are the same subscription key iff their source
//! strings are equal.

mod parser;

pub use parser::QueryError;

use crate::subscriber::Tags;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `CONTAINS` (substring match)
    Contains,
    /// `EXISTS` (tag presence)
    Exists,
}

impl Operator {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Contains | Self::Exists => false,
        }
    }
}

/// Numeric literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
}

impl Number {
    /// Parse a tag value as a number; non-finite floats are rejected.
    fn from_tag(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(int) = value.parse::<i64>() {
            return Some(Self::Int(int));
        }
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Self::Float)
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `'quoted string'`
    String(String),
    /// Integer or float.
    Number(Number),
    /// `DATE YYYY-MM-DD`
    Date(NaiveDate),
    /// `TIME <RFC3339>`
    Time(DateTime<Utc>),
}

/// A single `tag op operand` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Tag key the condition applies to.
    pub tag: String,
    /// Comparison operator.
    pub op: Operator,
    /// Operand; `None` only for `EXISTS`.
    pub operand: Option<Operand>,
}

impl Condition {
    /// Evaluate the condition against a message's tags.
    ///
    /// A condition on a tag the message does not carry never matches.
    #[must_use]
    pub fn matches(&self, tags: &Tags) -> bool {
        let Some(value) = tags.get(&self.tag) else {
            return false;
        };

        match (self.op, &self.operand) {
            (Operator::Exists, _) => true,
            (Operator::Contains, Some(Operand::String(needle))) => value.contains(needle.as_str()),
            (op, Some(Operand::String(expected))) => op == Operator::Eq && value == expected,
            (op, Some(Operand::Number(expected))) => Number::from_tag(value)
                .and_then(|actual| actual.compare(*expected))
                .is_some_and(|ordering| op.accepts(ordering)),
            (op, Some(Operand::Date(expected))) => {
                parse_date(value).is_some_and(|actual| op.accepts(actual.cmp(expected)))
            }
            (op, Some(Operand::Time(expected))) => {
                parse_time(value).is_some_and(|actual| op.accepts(actual.cmp(expected)))
            }
            (_, None) => false,
        }
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_time(value).map(|t| t.date_naive()))
}

/// A compiled, immutable event query.
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    conditions: Vec<Condition>,
}

impl Query {
    /// Compile a query string.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if `source` does not follow the grammar.
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        let conditions = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            conditions,
        })
    }

    /// A query that matches every message.
    #[must_use]
    pub fn all() -> Self {
        Self {
            source: String::new(),
            conditions: Vec::new(),
        }
    }

    /// Check whether a message with the given tags satisfies every condition.
    #[must_use]
    pub fn matches(&self, tags: &Tags) -> bool {
        self.conditions.iter().all(|c| c.matches(tags))
    }

    /// The query string this query was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Compiled conditions, in source order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Query {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
