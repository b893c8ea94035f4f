//! Write payloads and server controls

use serde::{Deserialize, Serialize};
use std::fmt;

use super::AttributeValue;

/// Modification kind of one attribute change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModType {
    Add,
    Delete,
    Replace,
}

impl fmt::Display for ModType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModType::Add => "add",
            ModType::Delete => "delete",
            ModType::Replace => "replace",
        })
    }
}

/// Caller-supplied attribute change: (operation, attribute, values)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDelta {
    pub op: ModType,
    pub attribute: String,
    pub values: Vec<AttributeValue>,
}

impl AttributeDelta {
    pub fn new<I, V>(op: ModType, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        Self {
            op,
            attribute: attribute.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add<I, V>(attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        Self::new(ModType::Add, attribute, values)
    }

    pub fn replace<I, V>(attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        Self::new(ModType::Replace, attribute, values)
    }

    pub fn delete<I, V>(attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        Self::new(ModType::Delete, attribute, values)
    }

    /// Remove the attribute entirely.
    pub fn clear(attribute: impl Into<String>) -> Self {
        Self::new(ModType::Delete, attribute, Vec::<AttributeValue>::new())
    }
}

/// Transport-ready attribute change, with the binary marking resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModType,
    /// Attribute name as sent on the wire (may carry the `;binary` option)
    pub attribute: String,
    pub values: Vec<AttributeValue>,
    pub binary: bool,
}

impl Modification {
    /// Values rendered for logging, binary content redacted.
    pub fn display_values(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|v| {
                if self.binary {
                    format!("<binary {} bytes>", v.as_bytes().len())
                } else {
                    v.redacted()
                }
            })
            .collect()
    }
}

/// Server-side request control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    /// Control OID
    pub oid: String,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

impl Control {
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            critical: false,
            value: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Manage DSA IT control (RFC 3296)
pub const MANAGE_DSA_IT_OID: &str = "2.16.840.1.113730.3.4.2";

/// Tree delete control
pub const TREE_DELETE_OID: &str = "1.2.840.113556.1.4.805";
