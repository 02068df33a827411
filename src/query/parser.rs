//! Parser for the query constructor's output.
//!
//! Two layers: [`parse_structured_query`] pulls the `{"query", "filter"}`
//! object out of the completion text (failures are `MalformedQuery`), and
//! [`parse_filter`] reads the filter grammar (failures are `FilterParse`).

use super::{Comparator, FilterExpression, Operator, StructuredQuery, Value, NO_FILTER};
use crate::error::{Result, RosebudError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawStructuredQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    filter: Option<String>,
}

/// Parse a completion into a [`StructuredQuery`].
///
/// `original` is the user's text, used when the model leaves the search
/// string empty.
pub fn parse_structured_query(completion: &str, original: &str) -> Result<StructuredQuery> {
    let json_str = extract_json_object(completion).ok_or_else(|| {
        RosebudError::MalformedQuery(format!(
            "no JSON object in response: {}",
            preview(completion)
        ))
    })?;

    let raw: RawStructuredQuery = serde_json::from_str(json_str).map_err(|e| {
        RosebudError::MalformedQuery(format!(
            "{}. Response was: {}",
            e,
            preview(completion)
        ))
    })?;

    let query = raw
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| original.trim().to_string());

    let filter = match raw.filter.as_deref() {
        Some(text) => parse_filter(text)?,
        None => None,
    };

    Ok(StructuredQuery { query, filter })
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Locate the JSON object, tolerating a ```json fence or prose around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a filter string. Returns `None` for the no-filter sentinel.
pub fn parse_filter(input: &str) -> Result<Option<FilterExpression>> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_FILTER) {
        return Ok(None);
    }

    let mut parser = Parser::new(trimmed);
    let expr = parser.expression()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(Some(expr))
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> RosebudError {
        RosebudError::FilterParse(format!("{} at offset {} in '{}'", message, self.pos, self.input))
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn identifier(&mut self) -> String {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn expression(&mut self) -> Result<FilterExpression> {
        let name = self.identifier();
        if name.is_empty() {
            return Err(self.error("expected a comparator or operator"));
        }
        self.expect('(')?;

        if let Ok(operator) = name.parse::<Operator>() {
            let mut arguments = vec![self.expression()?];
            loop {
                self.skip_whitespace();
                match self.peek() {
                    Some(',') => {
                        self.pos += 1;
                        arguments.push(self.expression()?);
                    }
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }

            // and(x) / or(x) carry no logic of their own.
            if operator != Operator::Not && arguments.len() == 1 {
                return Ok(arguments.remove(0));
            }
            if operator == Operator::Not && arguments.len() != 1 {
                return Err(self.error("not() takes exactly one statement"));
            }
            return Ok(FilterExpression::Operation { operator, arguments });
        }

        let comparator: Comparator = name.parse().map_err(|e: String| self.error(&e))?;
        let attribute = match self.literal()? {
            Value::String(s) => s,
            other => {
                return Err(self.error(&format!("attribute must be a quoted name, got {}", other)))
            }
        };
        self.expect(',')?;
        let mut value = self.literal()?;
        self.expect(')')?;

        if matches!(comparator, Comparator::In | Comparator::Nin) {
            value = value.into_list();
        } else if matches!(value, Value::List(_)) {
            return Err(self.error(&format!("{} takes a single value, not a list", comparator)));
        }

        Ok(FilterExpression::Comparison {
            comparator,
            attribute,
            value,
        })
    }

    fn literal(&mut self) -> Result<Value> {
        self.skip_whitespace();
        match self.peek() {
            Some(quote @ ('"' | '\'')) => self.string(quote).map(Value::String),
            Some('[') => self.list(),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(_) => {
                let word = self.identifier();
                match word.to_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(self.error("expected a literal")),
                }
            }
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => {
                    if let Some(escaped) = self.peek() {
                        self.pos += 1;
                        out.push(escaped);
                    }
                }
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    fn list(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                Some(',') if !items.is_empty() => self.pos += 1,
                Some(_) => {
                    let item = self.literal()?;
                    if matches!(item, Value::List(_)) {
                        return Err(self.error("nested lists are not allowed"));
                    }
                    items.push(item);
                }
                None => return Err(self.error("unterminated list")),
            }
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.error(&format!("invalid number '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| self.error(&format!("invalid number '{}'", text)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conjunction() {
        let expr = parse_filter(
            r#"and(eq("Genre", "Drama"), eq('Language', 'English'), lt("Runtime (minutes)", 120))"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            expr,
            FilterExpression::and(vec![
                FilterExpression::comparison(Comparator::Eq, "Genre", Value::String("Drama".into())),
                FilterExpression::comparison(Comparator::Eq, "Language", Value::String("English".into())),
                FilterExpression::comparison(Comparator::Lt, "Runtime (minutes)", Value::Integer(120)),
            ])
        );
    }

    #[test]
    fn test_parse_no_filter_sentinel() {
        assert_eq!(parse_filter("NO_FILTER").unwrap(), None);
        assert_eq!(parse_filter("  no_filter ").unwrap(), None);
        assert_eq!(parse_filter("").unwrap(), None);
    }

    #[test]
    fn test_membership_scalar_is_wrapped() {
        let expr = parse_filter(r#"nin("Actors", "Tom Hanks")"#).unwrap().unwrap();
        assert_eq!(
            expr,
            FilterExpression::comparison(
                Comparator::Nin,
                "Actors",
                Value::List(vec![Value::String("Tom Hanks".into())])
            )
        );
    }

    #[test]
    fn test_single_argument_operation_collapses() {
        let expr = parse_filter(r#"and(gt("Rating", 7.5))"#).unwrap().unwrap();
        assert_eq!(
            expr,
            FilterExpression::comparison(Comparator::Gt, "Rating", Value::Float(7.5))
        );
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let text = r#"or(in("Stream", ["Netflix", "Hulu"]), not(eq("Genre", "Horror")))"#;
        let expr = parse_filter(text).unwrap().unwrap();
        assert_eq!(expr.to_string(), text);
        assert_eq!(parse_filter(&expr.to_string()).unwrap().unwrap(), expr);
    }

    #[test]
    fn test_malformed_filters() {
        for bad in [
            r#"lt("Runtime (minutes)", 40))"#,
            r#"in("Directors", ["Yorgos Lanthimos]")"#,
            r#"like("Title", "Star")"#,
            r#"eq(Genre, "Drama")"#,
            r#"eq("Genre", ["Drama"])"#,
            r#"not(eq("Genre", "Drama"), eq("Genre", "Horror"))"#,
        ] {
            assert!(
                matches!(parse_filter(bad), Err(RosebudError::FilterParse(_))),
                "expected parse error for {}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_fenced_completion() {
        let completion = "```json\n{\n    \"query\": \"pets\",\n    \"filter\": \"and(eq(\\\"Genre\\\", \\\"Drama\\\"), lt(\\\"Runtime (minutes)\\\", 120))\"\n}\n```";
        let structured = parse_structured_query(completion, "drama about pets").unwrap();
        assert_eq!(structured.query, "pets");
        assert!(structured.filter.is_some());
    }

    #[test]
    fn test_empty_query_falls_back_to_original() {
        let structured =
            parse_structured_query(r#"{"query": " ", "filter": "NO_FILTER"}"#, "Something cozy").unwrap();
        assert_eq!(structured.query, "Something cozy");
        assert_eq!(structured.filter, None);
    }

    #[test]
    fn test_malformed_completion_is_distinct_from_filter_error() {
        assert!(matches!(
            parse_structured_query("I think you want dramas.", "q"),
            Err(RosebudError::MalformedQuery(_))
        ));
        assert!(matches!(
            parse_structured_query(r#"{"query": "x", "filter": "eq("}"#, "q"),
            Err(RosebudError::FilterParse(_))
        ));
    }
}
