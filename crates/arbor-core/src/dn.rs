//! Distinguished names (RFC 4514)

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// One attribute-value assertion of an RDN
#[derive(Debug, Clone)]
pub struct Ava {
    pub attribute: String,
    pub value: String,
}

/// Relative distinguished name; multi-valued RDNs join with `+`
#[derive(Debug, Clone)]
pub struct Rdn {
    pub avas: Vec<Ava>,
}

impl Rdn {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            avas: vec![Ava {
                attribute: attribute.into(),
                value: value.into(),
            }],
        }
    }

    /// Value of the given attribute in this RDN
    pub fn value_of(&self, attribute: &str) -> Option<&str> {
        self.avas
            .iter()
            .find(|a| a.attribute.eq_ignore_ascii_case(attribute))
            .map(|a| a.value.as_str())
    }

    fn normalized(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .avas
            .iter()
            .map(|a| (a.attribute.to_lowercase(), a.value.to_lowercase()))
            .collect();
        out.sort();
        out
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}={}", ava.attribute, escape_dn_value(&ava.value))?;
        }
        Ok(())
    }
}

impl FromStr for Rdn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_rdn(s)
    }
}

/// Distinguished name, most specific RDN first
#[derive(Debug, Clone, Default)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The empty DN (root DSE)
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::root());
        }
        let rdns = split_unescaped(s, &[',', ';'])
            .into_iter()
            .map(|part| parse_rdn(&part))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rdns })
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Leftmost RDN
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Dn {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Prepend an RDN
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// Append `suffix` below this DN: `ou=People` + `dc=example,dc=com`
    pub fn join(&self, suffix: &Dn) -> Dn {
        let mut rdns = self.rdns.clone();
        rdns.extend(suffix.rdns.iter().cloned());
        Dn { rdns }
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    /// Whether this DN lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.rdns.len() > ancestor.rdns.len() && self.ends_with(ancestor)
    }

    /// Whether this DN equals `suffix` or lies below it.
    pub fn ends_with(&self, suffix: &Dn) -> bool {
        if suffix.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - suffix.rdns.len();
        self.rdns[offset..] == suffix.rdns[..]
    }

    /// Case-folded string form used for comparisons and keys.
    pub fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(|rdn| {
                rdn.normalized()
                    .into_iter()
                    .map(|(a, v)| format!("{}={}", a, escape_dn_value(&v)))
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for Dn {}

impl std::hash::Hash for Dn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dn::parse(s)
    }
}

/// Escape an attribute value for use inside a DN.
pub fn escape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

fn split_unescaped(s: &str, separators: &[char]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if !quoted && separators.contains(&c) => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn parse_rdn(s: &str) -> Result<Rdn> {
    let avas = split_unescaped(s, &['+'])
        .into_iter()
        .map(|part| parse_ava(&part, s))
        .collect::<Result<Vec<_>>>()?;
    Ok(Rdn { avas })
}

fn parse_ava(part: &str, rdn: &str) -> Result<Ava> {
    let (attribute, raw) = part
        .split_once('=')
        .ok_or_else(|| Error::InvalidDn(format!("missing '=' in RDN: {}", rdn)))?;
    let attribute = attribute.trim();
    if attribute.is_empty()
        || !attribute
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';')
    {
        return Err(Error::InvalidDn(format!("invalid attribute type in RDN: {}", rdn)));
    }
    Ok(Ava {
        attribute: attribute.to_string(),
        value: unescape_value(raw.trim_start(), rdn)?,
    })
}

fn unescape_value(raw: &str, rdn: &str) -> Result<String> {
    // Quoted value: take it literally apart from escaped quotes
    if let Some(inner) = raw.trim_end().strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Ok(inner.replace("\\\"", "\"").replace("\\\\", "\\"));
    }

    let mut bytes: Vec<u8> = Vec::with_capacity(raw.len());
    // Length of the value up to and including the last escaped character,
    // so escaped trailing spaces survive trimming.
    let mut keep = 0;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let first = chars
            .next()
            .ok_or_else(|| Error::InvalidDn(format!("dangling escape in RDN: {}", rdn)))?;
        let hex_pair = first.is_ascii_hexdigit()
            && chars.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false);
        if hex_pair {
            let second = chars.next().unwrap_or('0');
            let byte = u8::from_str_radix(&format!("{}{}", first, second), 16)
                .map_err(|_| Error::InvalidDn(format!("bad hex escape in RDN: {}", rdn)))?;
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
        }
        keep = bytes.len();
    }

    while bytes.len() > keep && bytes.last() == Some(&b' ') {
        bytes.pop();
    }

    String::from_utf8(bytes)
        .map_err(|_| Error::InvalidDn(format!("value is not valid UTF-8 in RDN: {}", rdn)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let dn = Dn::parse("uid=bob, ou=People ,dc=example,dc=com").unwrap();
        assert_eq!(dn.len(), 4);
        assert_eq!(dn.rdn().unwrap().value_of("uid"), Some("bob"));
        assert_eq!(dn.to_string(), "uid=bob,ou=People,dc=example,dc=com");
    }

    #[test]
    fn test_escapes() {
        let dn = Dn::parse(r"cn=Doe\, John,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.rdn().unwrap().value_of("cn"), Some("Doe, John"));
        assert_eq!(dn.to_string(), r"cn=Doe\, John,ou=People,dc=example,dc=com");

        let dn = Dn::parse(r"cn=caf\C3\A9,dc=example").unwrap();
        assert_eq!(dn.rdn().unwrap().value_of("cn"), Some("café"));

        let dn = Dn::parse(r#"cn="a,b",dc=example"#).unwrap();
        assert_eq!(dn.rdn().unwrap().value_of("cn"), Some("a,b"));
    }

    #[test]
    fn test_multi_valued_rdn() {
        let dn = Dn::parse("cn=Bob+uid=bob,dc=example").unwrap();
        let rdn = dn.rdn().unwrap();
        assert_eq!(rdn.avas.len(), 2);
        assert_eq!(rdn, &Dn::parse("UID=Bob+cn=bob,dc=x").unwrap().rdns()[0]);
    }

    #[test]
    fn test_case_insensitive_equality() {
        let a = Dn::parse("uid=Bob,ou=People,dc=Example,dc=com").unwrap();
        let b = Dn::parse("UID=bob,OU=people,DC=example,DC=COM").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_hierarchy() {
        let base = Dn::parse("dc=example,dc=com").unwrap();
        let people = Dn::parse("ou=People,dc=example,dc=com").unwrap();
        let bob = people.child(Rdn::new("uid", "bob"));

        assert_eq!(bob.to_string(), "uid=bob,ou=People,dc=example,dc=com");
        assert_eq!(bob.parent().unwrap(), people);
        assert!(bob.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(base.ends_with(&base));
        assert_eq!(Dn::parse("ou=People").unwrap().join(&base), people);
        assert!(Dn::root().parent().is_none());
    }

    #[test]
    fn test_escape_dn_value() {
        assert_eq!(escape_dn_value("a,b+c"), r"a\,b\+c");
        assert_eq!(escape_dn_value("#tag"), r"\#tag");
        assert_eq!(escape_dn_value(" padded "), r"\ padded\ ");
        assert_eq!(escape_dn_value("plain"), "plain");
    }

    #[test]
    fn test_invalid_dn() {
        assert!(matches!(Dn::parse("novalue"), Err(Error::InvalidDn(_))));
        assert!(matches!(Dn::parse("uid=bob\\"), Err(Error::InvalidDn(_))));
        assert!(Dn::parse("").unwrap().is_empty());
    }
}
