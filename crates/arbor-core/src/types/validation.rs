//! Validation failure records

use serde::{Deserialize, Serialize};
use std::fmt;

/// One missing mandatory attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Canonical attribute name
    pub attribute: String,
    /// Object class declaring the attribute as MUST
    pub object_class: String,
    /// Other names of the attribute
    pub aliases: Vec<String>,
}

impl ValidationError {
    pub fn message(&self) -> String {
        if self.aliases.is_empty() {
            format!(
                "{} is required attribute by objectClass '{}'",
                self.attribute, self.object_class
            )
        } else {
            format!(
                "{} is required attribute by objectClass '{}': aliases: {}",
                self.attribute,
                self.object_class,
                self.aliases.join(", ")
            )
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Accumulated validation failures of one entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Errors recorded against one attribute
    pub fn on(&self, attribute: &str) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.attribute.eq_ignore_ascii_case(attribute))
            .collect()
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message()).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join("; "))
    }
}
