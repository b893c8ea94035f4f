//! Attribute values and multi-valued attribute maps

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single attribute value.
///
/// Directory values are octet strings; values that are valid UTF-8 and were
/// not flagged binary by the schema are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Build a value from raw octets, keeping text when the bytes are UTF-8.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => AttributeValue::Text(text),
            Err(e) => AttributeValue::Binary(e.into_bytes()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeValue::Text(s) => s.as_bytes(),
            AttributeValue::Binary(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            AttributeValue::Text(s) => s.into_bytes(),
            AttributeValue::Binary(b) => b,
        }
    }

    /// Convert to a binary value regardless of content.
    pub fn into_binary(self) -> Self {
        AttributeValue::Binary(self.into_bytes())
    }

    /// Whether the value content cannot be carried as plain text.
    ///
    /// Text containing NUL or other C0 control characters (except tab, CR and
    /// LF) is treated as binary content.
    pub fn is_binary(&self) -> bool {
        match self {
            AttributeValue::Binary(_) => true,
            AttributeValue::Text(s) => s
                .chars()
                .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Short representation suitable for logs.
    pub fn redacted(&self) -> String {
        if self.is_binary() {
            format!("<binary {} bytes>", self.as_bytes().len())
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Binary(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl AsRef<[u8]> for AttributeValue {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<&String> for AttributeValue {
    fn from(s: &String) -> Self {
        AttributeValue::Text(s.clone())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        AttributeValue::Binary(b)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(b: &[u8]) -> Self {
        AttributeValue::Binary(b.to_vec())
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Text(n.to_string())
    }
}

/// Insertion-ordered, multi-valued attribute map.
///
/// Attribute names are matched case-insensitively; the spelling used on first
/// insertion is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attributes {
    entries: Vec<(String, Vec<AttributeValue>)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// First value of an attribute, as text.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .and_then(|v| v.as_str())
    }

    /// All text values of an attribute.
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Whether the attribute carries at least one non-empty value.
    pub fn is_present(&self, name: &str) -> bool {
        self.get(name)
            .map(|values| values.iter().any(|v| !v.is_empty()))
            .unwrap_or(false)
    }

    /// Replace all values of an attribute. An empty value list removes it.
    pub fn set<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        let values: Vec<AttributeValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.remove(name);
            return;
        }
        match self.position(name) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((name.to_string(), values)),
        }
    }

    /// Append values, skipping ones already present.
    pub fn append<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        let i = match self.position(name) {
            Some(i) => i,
            None => {
                self.entries.push((name.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        for value in values {
            let value = value.into();
            if !self.entries[i].1.contains(&value) {
                self.entries[i].1.push(value);
            }
        }
        if self.entries[i].1.is_empty() {
            self.entries.remove(i);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy with attribute names sorted case-insensitively and values sorted,
    /// used for order-independent comparison.
    pub fn normalized(&self) -> Vec<(String, Vec<AttributeValue>)> {
        let mut out: Vec<(String, Vec<AttributeValue>)> = self
            .entries
            .iter()
            .map(|(k, v)| {
                let mut v = v.clone();
                v.sort();
                (k.to_lowercase(), v)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Attributes {}

impl<K, I, V> FromIterator<(K, I)> for Attributes
where
    K: AsRef<str>,
    I: IntoIterator<Item = V>,
    V: Into<AttributeValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut attrs = Attributes::new();
        for (name, values) in iter {
            attrs.append(name.as_ref(), values);
        }
        attrs
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Vec<AttributeValue>);
    type IntoIter = std::vec::IntoIter<(String, Vec<AttributeValue>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup_keeps_first_spelling() {
        let mut attrs = Attributes::new();
        attrs.set("objectClass", ["top", "person"]);
        attrs.append("OBJECTCLASS", ["person", "posixAccount"]);

        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["objectClass"]);
        assert_eq!(attrs.texts("objectclass"), vec!["top", "person", "posixAccount"]);
    }

    #[test]
    fn test_set_empty_removes() {
        let mut attrs = Attributes::new();
        attrs.set("sn", ["Doe"]);
        attrs.set("sn", Vec::<String>::new());
        assert!(!attrs.contains("sn"));
    }

    #[test]
    fn test_presence_ignores_empty_values() {
        let mut attrs = Attributes::new();
        attrs.set("sn", [""]);
        assert!(attrs.contains("sn"));
        assert!(!attrs.is_present("sn"));
    }

    #[test]
    fn test_equality_is_order_independent() {
        let a: Attributes = vec![("cn", vec!["a"]), ("sn", vec!["x", "y"])].into_iter().collect();
        let b: Attributes = vec![("SN", vec!["y", "x"]), ("cn", vec!["a"])].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_binary_detection() {
        assert!(!AttributeValue::from("plain text\n").is_binary());
        assert!(AttributeValue::from("nul\0inside").is_binary());
        assert!(AttributeValue::from_bytes(vec![0xff, 0xd8, 0xff]).is_binary());
        assert_eq!(
            AttributeValue::from_bytes(vec![0xff, 0xd8]).redacted(),
            "<binary 2 bytes>"
        );
    }
}
