//! RFC 4512 schema definition parser
//!
//! Definitions look like
//! `( 2.5.6.6 NAME 'person' SUP top STRUCTURAL MUST ( sn $ cn ) MAY description )`.
//! The tokenizer understands quoted strings, parenthesised `$`-lists and bare
//! flags; unknown `X-` extensions are kept verbatim.

use std::collections::HashMap;

use arbor_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Dollar,
    Quoted(String),
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '$' => {
                chars.next();
                tokens.push(Token::Dollar);
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some('\\') => {
                            // qdstring escapes: \27 for quote, \5C for backslash
                            let hex: String = chars.by_ref().take(2).collect();
                            match hex.to_ascii_uppercase().as_str() {
                                "27" => value.push('\''),
                                "5C" => value.push('\\'),
                                other => {
                                    value.push('\\');
                                    value.push_str(other);
                                }
                            }
                        }
                        Some(c) => value.push(c),
                        None => {
                            return Err(Error::Schema(format!(
                                "unterminated quoted string in definition: {}",
                                input
                            )))
                        }
                    }
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '$' | '\'') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

/// Generic parsed definition: numeric OID plus keyword fields
#[derive(Debug, Clone, Default)]
pub struct Definition {
    pub oid: String,
    /// Keyword (upper-cased) to values; flags map to an empty list
    fields: HashMap<String, Vec<String>>,
}

impl Definition {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut iter = tokens.into_iter().peekable();

        if iter.next() != Some(Token::Open) {
            return Err(Error::Schema(format!("definition must start with '(': {}", input)));
        }
        let oid = match iter.next() {
            Some(Token::Word(oid)) => oid,
            _ => return Err(Error::Schema(format!("definition lacks an OID: {}", input))),
        };

        let mut fields: HashMap<String, Vec<String>> = HashMap::new();
        let mut closed = false;
        while let Some(token) = iter.next() {
            let keyword = match token {
                Token::Close => {
                    closed = true;
                    break;
                }
                Token::Word(w) => w.to_ascii_uppercase(),
                other => {
                    return Err(Error::Schema(format!(
                        "unexpected token {:?} in definition: {}",
                        other, input
                    )))
                }
            };

            let values = match iter.peek() {
                Some(Token::Quoted(_)) | Some(Token::Open) => parse_values(&mut iter, input)?,
                // `SUP top`, `SYNTAX 1.3...`: a word value follows unless it is
                // the next keyword. Keywords are upper-case; values are not
                // reliably so, so consult the keyword table.
                Some(Token::Word(w)) if !is_keyword(w) && takes_value(&keyword) => {
                    match iter.next() {
                        Some(Token::Word(w)) => vec![w],
                        _ => Vec::new(),
                    }
                }
                _ => Vec::new(),
            };
            fields.entry(keyword).or_default().extend(values);
        }

        if !closed {
            return Err(Error::Schema(format!("definition is not closed: {}", input)));
        }

        Ok(Self { oid, fields })
    }

    pub fn values(&self, keyword: &str) -> &[String] {
        self.fields.get(keyword).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, keyword: &str) -> Option<&str> {
        self.values(keyword).first().map(String::as_str)
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.fields.contains_key(keyword)
    }

    pub fn names(&self) -> Vec<String> {
        self.values("NAME").to_vec()
    }

    fn flag_true(&self, keyword: &str) -> bool {
        self.first(keyword)
            .map(|v| v.eq_ignore_ascii_case("TRUE"))
            .unwrap_or(false)
    }
}

fn parse_values<I>(iter: &mut std::iter::Peekable<I>, input: &str) -> Result<Vec<String>>
where
    I: Iterator<Item = Token>,
{
    match iter.next() {
        Some(Token::Quoted(q)) => Ok(vec![q]),
        Some(Token::Open) => {
            let mut values = Vec::new();
            loop {
                match iter.next() {
                    Some(Token::Close) => break,
                    Some(Token::Dollar) => {}
                    Some(Token::Quoted(v)) | Some(Token::Word(v)) => values.push(v),
                    Some(Token::Open) | None => {
                        return Err(Error::Schema(format!("malformed list in definition: {}", input)))
                    }
                }
            }
            Ok(values)
        }
        _ => Ok(Vec::new()),
    }
}

const KEYWORDS: &[&str] = &[
    "NAME",
    "DESC",
    "OBSOLETE",
    "SUP",
    "ABSTRACT",
    "STRUCTURAL",
    "AUXILIARY",
    "MUST",
    "MAY",
    "EQUALITY",
    "ORDERING",
    "SUBSTR",
    "SYNTAX",
    "SINGLE-VALUE",
    "COLLECTIVE",
    "NO-USER-MODIFICATION",
    "USAGE",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word) || word.starts_with("X-")
}

fn takes_value(keyword: &str) -> bool {
    !matches!(
        keyword,
        "OBSOLETE"
            | "ABSTRACT"
            | "STRUCTURAL"
            | "AUXILIARY"
            | "SINGLE-VALUE"
            | "COLLECTIVE"
            | "NO-USER-MODIFICATION"
    )
}

// ============================================================================
// Typed definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassKind {
    Abstract,
    #[default]
    Structural,
    Auxiliary,
}

/// objectClasses definition
#[derive(Debug, Clone)]
pub struct ObjectClassDef {
    pub oid: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub superiors: Vec<String>,
    pub kind: ClassKind,
    pub must: Vec<String>,
    pub may: Vec<String>,
    pub obsolete: bool,
}

impl ObjectClassDef {
    pub fn parse(input: &str) -> Result<Self> {
        let def = Definition::parse(input)?;
        let kind = if def.has("ABSTRACT") {
            ClassKind::Abstract
        } else if def.has("AUXILIARY") {
            ClassKind::Auxiliary
        } else {
            ClassKind::Structural
        };
        Ok(Self {
            names: def.names(),
            description: def.first("DESC").map(String::from),
            superiors: def.values("SUP").to_vec(),
            must: def.values("MUST").to_vec(),
            may: def.values("MAY").to_vec(),
            obsolete: def.has("OBSOLETE"),
            kind,
            oid: def.oid,
        })
    }

    /// Primary name, or the OID when the class is unnamed
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }
}

/// attributeTypes definition
#[derive(Debug, Clone)]
pub struct AttributeTypeDef {
    pub oid: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub superior: Option<String>,
    /// Syntax OID with any `{length}` bound removed
    pub syntax: Option<String>,
    pub single_value: bool,
    pub no_user_modification: bool,
    pub usage: Option<String>,
}

impl AttributeTypeDef {
    pub fn parse(input: &str) -> Result<Self> {
        let def = Definition::parse(input)?;
        let syntax = def
            .first("SYNTAX")
            .map(|s| s.split('{').next().unwrap_or(s).to_string());
        Ok(Self {
            names: def.names(),
            description: def.first("DESC").map(String::from),
            superior: def.first("SUP").map(String::from),
            syntax,
            single_value: def.has("SINGLE-VALUE"),
            no_user_modification: def.has("NO-USER-MODIFICATION"),
            usage: def.first("USAGE").map(String::from),
            oid: def.oid,
        })
    }

    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }
}

/// ldapSyntaxes definition
#[derive(Debug, Clone)]
pub struct SyntaxDef {
    pub oid: String,
    pub description: Option<String>,
    pub not_human_readable: bool,
    pub binary_transfer_required: bool,
}

impl SyntaxDef {
    pub fn parse(input: &str) -> Result<Self> {
        let def = Definition::parse(input)?;
        Ok(Self {
            description: def.first("DESC").map(String::from),
            not_human_readable: def.flag_true("X-NOT-HUMAN-READABLE"),
            binary_transfer_required: def.flag_true("X-BINARY-TRANSFER-REQUIRED"),
            oid: def.oid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_class() {
        let oc = ObjectClassDef::parse(
            "( 2.16.840.1.113730.3.2.2 NAME 'inetOrgPerson' SUP organizationalPerson STRUCTURAL MAY ( audio $ businessCategory $ carLicense ) )",
        )
        .unwrap();
        assert_eq!(oc.name(), "inetOrgPerson");
        assert_eq!(oc.superiors, vec!["organizationalPerson"]);
        assert_eq!(oc.kind, ClassKind::Structural);
        assert!(oc.must.is_empty());
        assert_eq!(oc.may, vec!["audio", "businessCategory", "carLicense"]);
    }

    #[test]
    fn test_parse_single_must_and_abstract() {
        let oc = ObjectClassDef::parse("( 2.5.6.0 NAME 'top' ABSTRACT MUST objectClass )").unwrap();
        assert_eq!(oc.kind, ClassKind::Abstract);
        assert_eq!(oc.must, vec!["objectClass"]);
        assert!(oc.superiors.is_empty());
    }

    #[test]
    fn test_parse_multiple_names_and_superiors() {
        let oc = ObjectClassDef::parse(
            "( 1.1 NAME ( 'alpha' 'a' ) DESC 'it\\27s first' SUP ( top $ person ) AUXILIARY X-ORIGIN 'local' )",
        )
        .unwrap();
        assert_eq!(oc.names, vec!["alpha", "a"]);
        assert_eq!(oc.description.as_deref(), Some("it's first"));
        assert_eq!(oc.superiors, vec!["top", "person"]);
        assert_eq!(oc.kind, ClassKind::Auxiliary);
    }

    #[test]
    fn test_parse_attribute_type() {
        let at = AttributeTypeDef::parse(
            "( 2.5.4.3 NAME ( 'cn' 'commonName' ) DESC 'RFC4519: common name(s) for which the entity is known by' SUP name )",
        )
        .unwrap();
        assert_eq!(at.names, vec!["cn", "commonName"]);
        assert_eq!(at.superior.as_deref(), Some("name"));
        assert!(at.syntax.is_none());
        assert!(at.description.unwrap().contains("name(s)"));

        let at = AttributeTypeDef::parse(
            "( 0.9.2342.19200300.100.1.1 NAME ( 'uid' 'userid' ) EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15{256} SINGLE-VALUE )",
        )
        .unwrap();
        assert_eq!(at.syntax.as_deref(), Some("1.3.6.1.4.1.1466.115.121.1.15"));
        assert!(at.single_value);
    }

    #[test]
    fn test_parse_syntax_extensions() {
        let syntax = SyntaxDef::parse(
            "( 1.3.6.1.4.1.1466.115.121.1.8 DESC 'Certificate' X-BINARY-TRANSFER-REQUIRED 'TRUE' X-NOT-HUMAN-READABLE 'TRUE' )",
        )
        .unwrap();
        assert!(syntax.not_human_readable);
        assert!(syntax.binary_transfer_required);
        assert_eq!(syntax.description.as_deref(), Some("Certificate"));
    }

    #[test]
    fn test_malformed_definitions() {
        assert!(matches!(Definition::parse("2.5.6.0 NAME 'top'"), Err(Error::Schema(_))));
        assert!(matches!(Definition::parse("( 2.5.6.0 NAME 'top"), Err(Error::Schema(_))));
        assert!(matches!(Definition::parse("( 2.5.6.0 NAME 'top'"), Err(Error::Schema(_))));
    }
}
