//! Translation of [`FilterExpression`] trees into the document store's
//! native JSON filter language (`{"Genre": {"$eq": "Drama"}}`,
//! `{"$and": [...]}`), plus local evaluation of native filters.

use crate::error::{Result, RosebudError};
use crate::query::{Comparator, FilterExpression, Operator, StructuredQuery, Value};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::cmp::Ordering;

/// A filter in the store's native JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeFilter(Json);

impl NativeFilter {
    pub fn from_json(value: Json) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Json {
        &self.0
    }

    /// Read the native form back into an expression tree.
    ///
    /// Accepts the `{field: value}` shorthand for `$eq`, and treats an object
    /// with several keys as an implicit `and`.
    pub fn to_expression(&self) -> Result<FilterExpression> {
        parse_native(&self.0)
    }

    /// Evaluate the filter against a document's metadata.
    ///
    /// List-valued fields match `$eq`/`$in` when any element matches, and a
    /// missing field satisfies only `$ne` and `$nin`.
    pub fn matches(&self, metadata: &Map<String, Json>) -> bool {
        eval(&self.0, metadata)
    }
}

impl std::fmt::Display for NativeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps expression trees onto one store's filter language.
#[derive(Debug, Clone)]
pub struct FilterTranslator {
    comparators: Vec<Comparator>,
    operators: Vec<Operator>,
}

impl FilterTranslator {
    pub fn new(comparators: Vec<Comparator>, operators: Vec<Operator>) -> Self {
        Self {
            comparators,
            operators,
        }
    }

    /// The Pinecone metadata filter language. It has no negation operator.
    pub fn pinecone() -> Self {
        Self::new(Comparator::ALL.to_vec(), vec![Operator::And, Operator::Or])
    }

    pub fn supports_comparator(&self, comparator: Comparator) -> bool {
        self.comparators.contains(&comparator)
    }

    pub fn supports_operator(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }

    pub fn translate(&self, expr: &FilterExpression) -> Result<NativeFilter> {
        self.translate_node(expr).map(NativeFilter)
    }

    /// Translate the filter of a structured query, if it has one.
    pub fn translate_query(&self, query: &StructuredQuery) -> Result<Option<NativeFilter>> {
        query.filter.as_ref().map(|f| self.translate(f)).transpose()
    }

    fn translate_node(&self, expr: &FilterExpression) -> Result<Json> {
        match expr {
            FilterExpression::Comparison {
                comparator,
                attribute,
                value,
            } => {
                if !self.supports_comparator(*comparator) {
                    return Err(RosebudError::UnsupportedOperator(format!(
                        "comparator '{}' has no native form",
                        comparator
                    )));
                }
                let operand = match comparator {
                    Comparator::In | Comparator::Nin => value.clone().into_list().to_json(),
                    _ => value.to_json(),
                };
                Ok(json!({ (attribute.clone()): { (format!("${}", comparator)): operand } }))
            }
            FilterExpression::Operation { operator, arguments } => {
                if !self.supports_operator(*operator) {
                    return Err(RosebudError::UnsupportedOperator(format!(
                        "operator '{}' has no native form",
                        operator
                    )));
                }
                let args = arguments
                    .iter()
                    .map(|a| self.translate_node(a))
                    .collect::<Result<Vec<_>>>()?;
                Ok(json!({ (format!("${}", operator)): args }))
            }
        }
    }
}

fn parse_native(value: &Json) -> Result<FilterExpression> {
    let object = value
        .as_object()
        .ok_or_else(|| RosebudError::FilterParse(format!("native filter must be an object: {}", value)))?;

    let mut parts = Vec::new();
    for (key, inner) in object {
        if let Some(op) = key.strip_prefix('$') {
            let operator: Operator = op.parse().map_err(RosebudError::FilterParse)?;
            let items = inner.as_array().ok_or_else(|| {
                RosebudError::FilterParse(format!("'{}' expects an array", key))
            })?;
            let arguments = items.iter().map(parse_native).collect::<Result<Vec<_>>>()?;
            parts.push(FilterExpression::Operation { operator, arguments });
        } else {
            parts.extend(parse_field(key, inner)?);
        }
    }

    match parts.len() {
        0 => Err(RosebudError::FilterParse("empty native filter".to_string())),
        1 => Ok(parts.remove(0)),
        _ => Ok(FilterExpression::and(parts)),
    }
}

fn parse_field(field: &str, condition: &Json) -> Result<Vec<FilterExpression>> {
    let literal = |v: &Json| {
        Value::from_json(v)
            .ok_or_else(|| RosebudError::FilterParse(format!("unsupported literal for '{}': {}", field, v)))
    };

    match condition.as_object() {
        Some(ops) if ops.keys().all(|k| k.starts_with('$')) => ops
            .iter()
            .map(|(op, operand)| {
                let comparator: Comparator =
                    op.trim_start_matches('$').parse().map_err(RosebudError::FilterParse)?;
                Ok(FilterExpression::comparison(comparator, field, literal(operand)?))
            })
            .collect(),
        _ => Ok(vec![FilterExpression::comparison(
            Comparator::Eq,
            field,
            literal(condition)?,
        )]),
    }
}

fn eval(filter: &Json, metadata: &Map<String, Json>) -> bool {
    let Some(object) = filter.as_object() else {
        return false;
    };

    object.iter().all(|(key, inner)| match key.as_str() {
        "$and" => inner
            .as_array()
            .is_some_and(|items| items.iter().all(|f| eval(f, metadata))),
        "$or" => inner
            .as_array()
            .is_some_and(|items| items.iter().any(|f| eval(f, metadata))),
        field => {
            let actual = metadata.get(field);
            match inner.as_object() {
                Some(ops) if ops.keys().all(|k| k.starts_with('$')) => ops
                    .iter()
                    .all(|(op, operand)| holds(op, actual, operand)),
                _ => holds("$eq", actual, inner),
            }
        }
    })
}

fn holds(op: &str, actual: Option<&Json>, operand: &Json) -> bool {
    let actual = match actual {
        None | Some(Json::Null) => return matches!(op, "$ne" | "$nin"),
        Some(v) => v,
    };
    let candidates = operand.as_array();
    let in_operand = |v: &Json| candidates.is_some_and(|items| items.iter().any(|c| json_eq(v, c)));

    match (op, actual) {
        ("$eq", Json::Array(items)) => items.iter().any(|v| json_eq(v, operand)),
        ("$ne", Json::Array(items)) => !items.iter().any(|v| json_eq(v, operand)),
        ("$in", Json::Array(items)) => items.iter().any(in_operand),
        ("$nin", Json::Array(items)) => !items.iter().any(in_operand),
        ("$eq", v) => json_eq(v, operand),
        ("$ne", v) => !json_eq(v, operand),
        ("$in", v) => in_operand(v),
        ("$nin", v) => !in_operand(v),
        ("$gt", v) => compare(v, operand) == Some(Ordering::Greater),
        ("$gte", v) => matches!(compare(v, operand), Some(Ordering::Greater | Ordering::Equal)),
        ("$lt", v) => compare(v, operand) == Some(Ordering::Less),
        ("$lte", v) => matches!(compare(v, operand), Some(Ordering::Less | Ordering::Equal)),
        _ => false,
    }
}

fn json_eq(a: &Json, b: &Json) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Json, b: &Json) -> Option<Ordering> {
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}
