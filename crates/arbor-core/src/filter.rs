//! Filter compiler
//!
//! Lowers filter expressions into a single RFC 4515 filter string.
//!
//! Expressions are either built directly from [`Filter`] or given in one of
//! the dynamic forms (as `serde_json::Value`):
//! - a filter string, passed through (`"uid=bob"` becomes `"(uid=bob)"`)
//! - a mapping `{attribute: value}` or `{attribute: [values]}`
//! - an array `[operator, operand...]` with operator in `and`, `&`, `or`, `|`
//! - an array of `[attribute, value]` pairs
//!
//! Null, empty and whitespace-only input compile to `None`, the absent filter.

use serde_json::Value;

use crate::{Error, Result};

/// Boolean combinator of a filter group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    /// Parse an operator token (`and`, `&`, `or`, `|`), case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "and" | "&" => Some(Operator::And),
            "or" | "|" => Some(Operator::Or),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Operator::And => '&',
            Operator::Or => '|',
        }
    }
}

/// Filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Equality clause; the value is escaped on compilation
    Attribute(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Pre-formed filter string, passed through unescaped
    Raw(String),
}

impl Filter {
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Attribute(attribute.into(), value.into())
    }

    pub fn raw(filter: impl Into<String>) -> Self {
        Filter::Raw(filter.into())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    /// Lower a dynamic expression. Returns `None` for the absent filter.
    pub fn from_value(value: &Value) -> Result<Option<Filter>> {
        parse(value, None)
    }

    /// Compile into a filter string. Returns `None` when nothing remains
    /// after dropping blank fragments.
    pub fn compile(&self) -> Option<String> {
        match self {
            Filter::Raw(raw) => normalize_raw(raw),
            Filter::Attribute(name, value) => {
                Some(format!("({}={})", name, escape_filter_value(value)))
            }
            Filter::And(filters) => compile_group(Operator::And, filters),
            Filter::Or(filters) => compile_group(Operator::Or, filters),
        }
    }
}

impl From<&str> for Filter {
    fn from(s: &str) -> Self {
        Filter::Raw(s.to_string())
    }
}

impl From<String> for Filter {
    fn from(s: String) -> Self {
        Filter::Raw(s)
    }
}

/// Compile a dynamic filter expression.
pub fn compile(value: &Value) -> Result<Option<String>> {
    Ok(Filter::from_value(value)?.and_then(|f| f.compile()))
}

/// Escape a filter assertion value.
///
/// `=`, `,`, `(`, `)`, `\` and NUL are replaced by their `\XX` escape. A single
/// `*` is a wildcard and is kept; `**` stands for a literal asterisk.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("\\2A");
            }
            '=' | ',' | '(' | ')' | '\\' | '\0' => {
                out.push_str(&format!("\\{:02X}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out
}

fn normalize_raw(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.starts_with('(') {
        Some(trimmed.to_string())
    } else {
        Some(format!("({})", trimmed))
    }
}

fn compile_group(operator: Operator, filters: &[Filter]) -> Option<String> {
    let mut parts: Vec<String> = filters.iter().filter_map(Filter::compile).collect();
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(format!("({}{})", operator.symbol(), parts.concat())),
    }
}

// ============================================================================
// Dynamic form lowering
// ============================================================================

/// A bare word in an array is an operator token rather than a filter.
fn is_operator_token(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty() && !trimmed.contains('=') && !trimmed.starts_with('(')
}

fn assert_operator(token: &str) -> Result<Operator> {
    Operator::parse(token).ok_or_else(|| Error::InvalidFilterOperator(token.to_string()))
}

fn key_string(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::InvalidFilter(format!(
            "attribute name must be a string: {}",
            other
        ))),
    }
}

fn parse(value: &Value, operator: Option<Operator>) -> Result<Option<Filter>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(normalize_raw(s).map(Filter::Raw)),
        Value::Bool(_) | Value::Number(_) => Ok(Some(Filter::Raw(format!("({})", value)))),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut components = Vec::with_capacity(keys.len());
            for key in keys {
                components.push(construct_component(key, &map[key.as_str()], operator)?);
            }
            Ok(combine(components, operator))
        }
        Value::Array(items) => {
            let (operator, items) = normalize_array(items, operator)?;
            let mut components = Vec::with_capacity(items.len());
            for item in items {
                components.push(parse_array_component(item, operator)?);
            }
            Ok(combine(components, operator))
        }
    }
}

fn normalize_array(
    items: &[Value],
    operator: Option<Operator>,
) -> Result<(Option<Operator>, &[Value])> {
    match items.first() {
        Some(Value::String(first)) if is_operator_token(first) => {
            Ok((Some(assert_operator(first)?), &items[1..]))
        }
        _ => Ok((operator, items)),
    }
}

fn parse_array_component(item: &Value, operator: Option<Operator>) -> Result<Option<Filter>> {
    match item {
        Value::Array(pair) if pair.len() == 2 => {
            let (key, value) = (&pair[0], &pair[1]);
            if key.as_str().and_then(Operator::parse).is_some() {
                parse(item, None)
            } else if value.is_object() {
                let token = key_string(key)?;
                parse(value, Some(assert_operator(&token)?))
            } else {
                construct_component(&key_string(key)?, value, operator)
            }
        }
        Value::String(s) if is_operator_token(s) => {
            assert_operator(s)?;
            Ok(None)
        }
        other => parse(other, operator),
    }
}

fn construct_component(
    key: &str,
    value: &Value,
    operator: Option<Operator>,
) -> Result<Option<Filter>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(Filter::Attribute(key.to_string(), s.clone()))),
        Value::Bool(_) | Value::Number(_) => {
            Ok(Some(Filter::Attribute(key.to_string(), value.to_string())))
        }
        Value::Array(values) => {
            let mut pairs: Vec<Value> = Vec::with_capacity(values.len());
            for val in values {
                match val {
                    Value::Array(inner) => {
                        pairs.extend(inner.iter().map(|v| Value::Array(vec![key.into(), v.clone()])))
                    }
                    _ => pairs.push(Value::Array(vec![key.into(), val.clone()])),
                }
            }
            // `{"uid": ["or", "bob", "alice"]}` applies the leading operator
            let leading = pairs
                .first()
                .and_then(|p| p.get(1))
                .and_then(Value::as_str)
                .filter(|s| Operator::parse(s).is_some())
                .map(str::to_string);
            if let Some(token) = leading {
                pairs[0] = Value::String(token);
            }
            parse(&Value::Array(pairs), operator)
        }
        Value::Object(_) => Err(Error::InvalidFilter(format!(
            "nested mapping is not a value for attribute {}",
            key
        ))),
    }
}

fn combine(components: Vec<Option<Filter>>, operator: Option<Operator>) -> Option<Filter> {
    let mut filters: Vec<Filter> = components.into_iter().flatten().collect();
    match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(match operator.unwrap_or(Operator::And) {
            Operator::And => Filter::And(filters),
            Operator::Or => Filter::Or(filters),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_filter(expected: Option<&str>, input: Value) {
        assert_eq!(compile(&input).unwrap().as_deref(), expected, "input: {}", input);
    }

    #[test]
    fn test_filter_with_escaped_character() {
        assert_filter(Some("(uid=Alice\\3DBob)"), json!({"uid": "Alice=Bob"}));
        assert_filter(Some("(uid=Alice\\2CBob)"), json!({"uid": "Alice,Bob"}));
        assert_filter(Some("(uid=Alice\\3DBob\\2C)"), json!({"uid": "Alice=Bob,"}));
        assert_filter(Some("(uid=Alice\\3D\\2CBob)"), json!({"uid": "Alice=,Bob"}));
    }

    #[test]
    fn test_empty_filter() {
        assert_filter(None, Value::Null);
        assert_filter(None, json!(""));
        assert_filter(None, json!("   "));
        assert_eq!(Filter::raw("  ").compile(), None);
    }

    #[test]
    fn test_simple_filter() {
        assert_filter(Some("(objectClass=*)"), json!("objectClass=*"));
        assert_filter(Some("(objectClass=*)"), json!("(objectClass=*)"));
        assert_filter(
            Some("(&(uid=bob)(objectClass=*))"),
            json!("(&(uid=bob)(objectClass=*))"),
        );

        assert_filter(Some("(objectClass=*)"), json!({"objectClass": "*"}));
        assert_filter(
            Some("(&(objectClass=*)(uid=bob))"),
            json!({"uid": "bob", "objectClass": "*"}),
        );

        assert_filter(
            Some("(&(uid=bob)(objectClass=*))"),
            json!(["and", "uid=bob", "objectClass=*"]),
        );
        assert_filter(
            Some("(&(uid=bob)(objectClass=*))"),
            json!(["&", "uid=bob", "objectClass=*"]),
        );
        assert_filter(
            Some("(|(uid=bob)(objectClass=*))"),
            json!(["or", "uid=bob", "objectClass=*"]),
        );
        assert_filter(
            Some("(|(uid=bob)(objectClass=*))"),
            json!(["|", "uid=bob", "objectClass=*"]),
        );
    }

    #[test]
    fn test_multi_value_filter() {
        let expected = Some("(&(objectClass=top)(objectClass=posixAccount))");
        assert_filter(expected, json!({"objectClass": ["top", "posixAccount"]}));
        assert_filter(
            expected,
            json!([["objectClass", "top"], ["objectClass", "posixAccount"]]),
        );
        assert_filter(expected, json!([["objectClass", ["top", "posixAccount"]]]));
    }

    #[test]
    fn test_nested_filter() {
        assert_filter(
            Some("(&(objectClass=*)(uid=bob))"),
            json!(["and", {"uid": "bob", "objectClass": "*"}]),
        );
        assert_filter(
            Some("(&(objectClass=*)(|(uid=bob)(uid=alice)))"),
            json!(["and", {"objectClass": "*"}, ["or", ["uid", "bob"], ["uid", "alice"]]]),
        );
        assert_filter(
            Some("(&(objectClass=*)(|(uid=bob)(uid=alice)))"),
            json!(["and", {"objectClass": "*", "uid": ["or", "bob", "alice"]}]),
        );
        assert_filter(
            Some("(&(gidNumber=100001)(|(uid=temp-user1)(uid=temp-user2)))"),
            json!([
                "and",
                ["and", {"gidNumber": ["100001"]}],
                ["or", {"uid": ["temp-user1", "temp-user2"]}]
            ]),
        );
        assert_filter(
            Some("(&(gidNumber=100001)(objectClass=person)(objectClass=posixAccount))"),
            json!([
                "and",
                ["or", ["gidNumber", "100001"]],
                ["objectClass", "person"],
                ["objectClass", "posixAccount"]
            ]),
        );
    }

    #[test]
    fn test_invalid_operator() {
        let err = compile(&json!(["xxx", {"uid": "bob", "objectClass": "*"}])).unwrap_err();
        match err {
            Error::InvalidFilterOperator(token) => assert_eq!(token, "xxx"),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(
            compile(&json!([["not", {"uid": "bob"}]])),
            Err(Error::InvalidFilterOperator(_))
        ));
    }

    #[test]
    fn test_single_fragment_collapses() {
        assert_filter(Some("(uid=bob)"), json!(["and", ["uid", "bob"]]));
        assert_filter(Some("(uid=bob)"), json!(["or", {"uid": "bob"}]));
        assert_filter(Some("(uid=bob)"), json!(["and", "", {"uid": "bob"}, null]));
    }

    #[test]
    fn test_typed_and_dynamic_forms_agree() {
        let typed = Filter::and([Filter::eq("objectClass", "*"), Filter::eq("uid", "bob")]);
        let from_mapping = compile(&json!({"uid": "bob", "objectClass": "*"})).unwrap();
        let from_pairs = compile(&json!([["objectClass", "*"], ["uid", "bob"]])).unwrap();
        let from_string = compile(&json!("(&(objectClass=*)(uid=bob))")).unwrap();

        assert_eq!(typed.compile(), from_mapping);
        assert_eq!(from_mapping, from_pairs);
        assert_eq!(from_pairs, from_string);
    }

    #[test]
    fn test_wildcard_and_literal_asterisk() {
        assert_eq!(escape_filter_value("bo*"), "bo*");
        assert_eq!(escape_filter_value("a**b"), "a\\2Ab");
        assert_eq!(escape_filter_value("(admin)\\"), "\\28admin\\29\\5C");
        assert_eq!(escape_filter_value("a\0b"), "a\\00b");
        assert_eq!(escape_filter_value("Jöhn Doe"), "Jöhn Doe");
    }

    #[test]
    fn test_numeric_values() {
        assert_filter(Some("(uidNumber=1000)"), json!({"uidNumber": 1000}));
    }

    #[test]
    fn test_nested_mapping_value_is_rejected() {
        assert!(matches!(
            compile(&json!({"uid": {"cn": "x"}})),
            Err(Error::InvalidFilter(_))
        ));
    }
}
