//! Structured queries: a semantic search string plus an optional metadata filter.
//!
//! The query constructor asks a language model to translate free text into
//! a [`StructuredQuery`]. The model writes filters in a small function-call
//! grammar (`and(eq("Genre", "Drama"), lt("Runtime (minutes)", 120))`) which
//! [`parser`] turns into a [`FilterExpression`] tree.

mod constructor;
pub mod examples;
pub mod parser;

pub use constructor::{ConstructorConfig, LlmQueryConstructor, QueryConstructor};
pub use examples::FewShotExample;
pub use parser::{parse_filter, parse_structured_query};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel the model emits when a query needs no metadata filter.
pub const NO_FILTER: &str = "NO_FILTER";

/// Comparison operators allowed in filter leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Comparator {
    pub const ALL: [Comparator; 8] = [
        Comparator::Eq,
        Comparator::Ne,
        Comparator::Gt,
        Comparator::Gte,
        Comparator::Lt,
        Comparator::Lte,
        Comparator::In,
        Comparator::Nin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::Ne => "ne",
            Comparator::Gt => "gt",
            Comparator::Gte => "gte",
            Comparator::Lt => "lt",
            Comparator::Lte => "lte",
            Comparator::In => "in",
            Comparator::Nin => "nin",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Comparator::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown comparator: {}", s))
    }
}

/// Logical operators combining filter statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
    /// Recognized by the grammar but not expressible by every store.
    Not,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "and" => Ok(Operator::And),
            "or" => Ok(Operator::Or),
            "not" => Ok(Operator::Not),
            _ => Err(format!("Unknown operator: {}", s)),
        }
    }
}

/// A literal value in a filter comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Wrap a scalar in a single-element list; lists are returned unchanged.
    pub fn into_list(self) -> Value {
        match self {
            Value::List(_) => self,
            scalar => Value::List(vec![scalar]),
        }
    }

    /// Convert from JSON, rejecting objects and nulls.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) if n.is_f64() => n.as_f64().map(Value::Float),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Boolean combination of field comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterExpression {
    Comparison {
        comparator: Comparator,
        attribute: String,
        value: Value,
    },
    Operation {
        operator: Operator,
        arguments: Vec<FilterExpression>,
    },
}

impl FilterExpression {
    pub fn comparison(comparator: Comparator, attribute: &str, value: Value) -> Self {
        FilterExpression::Comparison {
            comparator,
            attribute: attribute.to_string(),
            value,
        }
    }

    pub fn and(arguments: Vec<FilterExpression>) -> Self {
        FilterExpression::Operation {
            operator: Operator::And,
            arguments,
        }
    }

    pub fn or(arguments: Vec<FilterExpression>) -> Self {
        FilterExpression::Operation {
            operator: Operator::Or,
            arguments,
        }
    }

    /// Visit every node depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a FilterExpression)) {
        visit(self);
        if let FilterExpression::Operation { arguments, .. } = self {
            for arg in arguments {
                arg.walk(visit);
            }
        }
    }

    pub fn comparators(&self) -> Vec<Comparator> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if let FilterExpression::Comparison { comparator, .. } = node {
                if !out.contains(comparator) {
                    out.push(*comparator);
                }
            }
        });
        out
    }

    pub fn operators(&self) -> Vec<Operator> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if let FilterExpression::Operation { operator, .. } = node {
                if !out.contains(operator) {
                    out.push(*operator);
                }
            }
        });
        out
    }
}

/// Renders back into the grammar the model writes.
impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpression::Comparison {
                comparator,
                attribute,
                value,
            } => write!(f, "{}({:?}, {})", comparator, attribute, value),
            FilterExpression::Operation { operator, arguments } => {
                write!(f, "{}(", operator)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Parsed `{search string, filter}` pair derived from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    /// Text compared against document contents. Never empty.
    pub query: String,
    /// `None` is the "no filter" outcome.
    pub filter: Option<FilterExpression>,
}

impl StructuredQuery {
    pub fn new(query: impl Into<String>, filter: Option<FilterExpression>) -> Self {
        Self {
            query: query.into(),
            filter,
        }
    }

    /// Filter rendered in the model's grammar, or the sentinel.
    pub fn filter_string(&self) -> String {
        self.filter
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_else(|| NO_FILTER.to_string())
    }
}

impl fmt::Display for StructuredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query={:?} filter={}", self.query, self.filter_string())
    }
}
