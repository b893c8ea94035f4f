//! Object class management
//!
//! Every change to an entry's `objectClass` goes through
//! [`MappedEntry::replace_class`], which checks the new set against the
//! schema and the mapping before touching the attribute.

use serde_json::Value;

use arbor_core::{Error, Result, OBJECT_CLASS};

use crate::entry::MappedEntry;

/// An object class as supplied by a caller. Only names are valid; anything
/// else is rejected with a type error.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassValue {
    Name(String),
    Other(Value),
}

impl ClassValue {
    fn describe(&self) -> String {
        match self {
            ClassValue::Name(name) => format!("string:{:?}", name),
            ClassValue::Other(value) => {
                let kind = match value {
                    Value::Null => "null",
                    Value::Bool(_) => "bool",
                    Value::Number(_) => "number",
                    Value::String(_) => "string",
                    Value::Array(_) => "array",
                    Value::Object(_) => "object",
                };
                format!("{}:{}", kind, value)
            }
        }
    }
}

impl From<&str> for ClassValue {
    fn from(s: &str) -> Self {
        ClassValue::Name(s.to_string())
    }
}

impl From<String> for ClassValue {
    fn from(s: String) -> Self {
        ClassValue::Name(s)
    }
}

impl From<&String> for ClassValue {
    fn from(s: &String) -> Self {
        ClassValue::Name(s.clone())
    }
}

impl From<Value> for ClassValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ClassValue::Name(s),
            other => ClassValue::Other(other),
        }
    }
}

fn dedupe(classes: Vec<ClassValue>) -> Vec<ClassValue> {
    let mut out: Vec<ClassValue> = Vec::with_capacity(classes.len());
    for class in classes {
        let duplicate = out.iter().any(|seen| match (seen, &class) {
            (ClassValue::Name(a), ClassValue::Name(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        });
        if !duplicate {
            out.push(class);
        }
    }
    out
}

fn sorted_lowercase(classes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = classes.iter().map(|c| c.to_lowercase()).collect();
    out.sort();
    out
}

impl MappedEntry {
    /// Current object classes
    pub fn classes(&self) -> Vec<String> {
        self.attributes.texts(OBJECT_CLASS)
    }

    pub fn add_class<I, C>(&mut self, classes: I) -> Result<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<ClassValue>,
    {
        let mut all: Vec<ClassValue> = self.classes().into_iter().map(ClassValue::Name).collect();
        all.extend(classes.into_iter().map(Into::into));
        self.replace_class(all)
    }

    pub fn remove_class<I, C>(&mut self, classes: I) -> Result<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<ClassValue>,
    {
        let removed: Vec<ClassValue> = classes.into_iter().map(Into::into).collect();
        let remaining: Vec<ClassValue> = self
            .classes()
            .into_iter()
            .filter(|current| {
                !removed.iter().any(|r| match r {
                    ClassValue::Name(name) => name.eq_ignore_ascii_case(current),
                    ClassValue::Other(_) => false,
                })
            })
            .map(ClassValue::Name)
            .collect();
        self.replace_class(remaining)
    }

    /// Set the object classes after checking, in order, that every value is a
    /// name, every name is known to the schema, and every class the mapping
    /// requires is still present directly or through a subclass.
    pub fn replace_class<I, C>(&mut self, classes: I) -> Result<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<ClassValue>,
    {
        let classes = dedupe(classes.into_iter().map(Into::into).collect());

        let invalid: Vec<String> = classes
            .iter()
            .filter(|c| !matches!(c, ClassValue::Name(_)))
            .map(ClassValue::describe)
            .collect();
        if !invalid.is_empty() {
            return Err(Error::ObjectClassType(invalid.join(", ")));
        }

        let names: Vec<String> = classes
            .into_iter()
            .filter_map(|c| match c {
                ClassValue::Name(name) => Some(name),
                ClassValue::Other(_) => None,
            })
            .collect();

        let unknown: Vec<&str> = names
            .iter()
            .filter(|name| !self.schema().exist_object_class(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(Error::ObjectClass(unknown.join(", ")));
        }

        let missing: Vec<&str> = self
            .mapping()
            .classes
            .iter()
            .filter(|required| !names.iter().any(|name| self.schema().is_kind_of(name, required)))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::RequiredObjectClassMissed(missing.join(", ")));
        }

        if sorted_lowercase(&names) != sorted_lowercase(&self.classes()) {
            self.attributes.set(OBJECT_CLASS, names);
        }
        Ok(())
    }

    /// Add the mapping's recommended classes.
    pub fn ensure_recommended_classes(&mut self) -> Result<()> {
        let recommended = self.mapping().recommended_classes.clone();
        self.add_class(recommended)
    }
}
