//! RFC 4515 filter evaluation for the in-memory directory

use arbor_core::types::{AttributeValue, Attributes};

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Present(String),
    Equal(String, String),
    Approx(String, String),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl FilterNode {
    pub fn parse(filter: &str) -> Result<Self, TransportError> {
        let filter = filter.trim();
        let mut parser = Parser {
            chars: filter.chars().collect(),
            pos: 0,
        };
        let node = parser.filter()?;
        if parser.pos != parser.chars.len() {
            return Err(protocol_error(filter));
        }
        Ok(node)
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            FilterNode::And(nodes) => nodes.iter().all(|n| n.matches(attributes)),
            FilterNode::Or(nodes) => nodes.iter().any(|n| n.matches(attributes)),
            FilterNode::Not(node) => !node.matches(attributes),
            FilterNode::Present(attr) => attributes.contains(attr),
            FilterNode::Equal(attr, value) | FilterNode::Approx(attr, value) => {
                values(attributes, attr).any(|v| v.eq_ignore_ascii_case(value))
            }
            FilterNode::GreaterOrEqual(attr, value) => {
                values(attributes, attr).any(|v| compare(&v, value).is_ge())
            }
            FilterNode::LessOrEqual(attr, value) => {
                values(attributes, attr).any(|v| compare(&v, value).is_le())
            }
            FilterNode::Substring {
                attribute,
                initial,
                any,
                last,
            } => values(attributes, attribute)
                .any(|v| substring_match(&v, initial.as_deref(), any, last.as_deref())),
        }
    }
}

fn protocol_error(filter: &str) -> TransportError {
    TransportError::result(87, format!("Bad search filter: {}", filter))
}

fn values<'a>(attributes: &'a Attributes, attr: &str) -> impl Iterator<Item = String> + 'a {
    attributes
        .get(attr)
        .unwrap_or(&[])
        .iter()
        .map(AttributeValue::to_string)
}

/// Integers compare numerically, everything else case-insensitively.
fn compare(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();
    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        let part = part.to_lowercase();
        match rest.find(part.as_str()) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(last.to_lowercase().as_str()),
        None => true,
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn source(&self) -> String {
        self.chars.iter().collect()
    }

    fn expect(&mut self, c: char) -> Result<(), TransportError> {
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(protocol_error(&self.source()))
        }
    }

    fn filter(&mut self) -> Result<FilterNode, TransportError> {
        self.expect('(')?;
        let node = match self.chars.get(self.pos) {
            Some('&') => {
                self.pos += 1;
                FilterNode::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                FilterNode::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                FilterNode::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(protocol_error(&self.source())),
        };
        self.expect(')')?;
        Ok(node)
    }

    fn filter_list(&mut self) -> Result<Vec<FilterNode>, TransportError> {
        let mut nodes = Vec::new();
        while self.chars.get(self.pos) == Some(&'(') {
            nodes.push(self.filter()?);
        }
        Ok(nodes)
    }

    fn item(&mut self) -> Result<FilterNode, TransportError> {
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            if matches!(c, '=' | '~' | '>' | '<' | ')' | '(') {
                break;
            }
            self.pos += 1;
        }
        let attribute: String = self.chars[start..self.pos].iter().collect();
        let attribute = attribute.trim().to_string();
        if attribute.is_empty() {
            return Err(protocol_error(&self.source()));
        }

        let op = match self.chars.get(self.pos) {
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(&c) if matches!(c, '~' | '>' | '<') => {
                self.pos += 1;
                self.expect('=')?;
                c
            }
            _ => return Err(protocol_error(&self.source())),
        };

        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            if c == ')' {
                break;
            }
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();

        Ok(match op {
            '~' => FilterNode::Approx(attribute, unescape(&raw)?),
            '>' => FilterNode::GreaterOrEqual(attribute, unescape(&raw)?),
            '<' => FilterNode::LessOrEqual(attribute, unescape(&raw)?),
            _ if raw == "*" => FilterNode::Present(attribute),
            _ if raw.contains('*') => {
                let parts: Vec<&str> = raw.split('*').collect();
                let n = parts.len();
                let initial = Some(parts[0]).filter(|s| !s.is_empty()).map(unescape).transpose()?;
                let last = Some(parts[n - 1]).filter(|s| !s.is_empty()).map(unescape).transpose()?;
                let any = parts[1..n - 1]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .map(|s| unescape(s))
                    .collect::<Result<Vec<_>, _>>()?;
                FilterNode::Substring {
                    attribute,
                    initial,
                    any,
                    last,
                }
            }
            _ => FilterNode::Equal(attribute, unescape(&raw)?),
        })
    }
}

/// Decode `\XX` escapes in an assertion value.
fn unescape(raw: &str) -> Result<String, TransportError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| protocol_error(raw))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| protocol_error(raw))
}
