//! Schema registry
//!
//! Immutable snapshot of the server schema. Built once per session from the
//! schema subentry and shared as `Arc<SchemaRegistry>`.

use std::collections::{HashMap, HashSet};

use arbor_core::types::Attributes;
use arbor_core::Result;
use tracing::{debug, warn};

use crate::parser::{AttributeTypeDef, ClassKind, ObjectClassDef, SyntaxDef};

// ===== Well-known syntaxes (RFC 4517) =====

pub const SYNTAX_AUDIO: &str = "1.3.6.1.4.1.1466.115.121.1.4";
pub const SYNTAX_BINARY: &str = "1.3.6.1.4.1.1466.115.121.1.5";
pub const SYNTAX_CERTIFICATE: &str = "1.3.6.1.4.1.1466.115.121.1.8";
pub const SYNTAX_CERTIFICATE_LIST: &str = "1.3.6.1.4.1.1466.115.121.1.9";
pub const SYNTAX_CERTIFICATE_PAIR: &str = "1.3.6.1.4.1.1466.115.121.1.10";
pub const SYNTAX_FAX: &str = "1.3.6.1.4.1.1466.115.121.1.23";
pub const SYNTAX_JPEG: &str = "1.3.6.1.4.1.1466.115.121.1.28";
pub const SYNTAX_OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";

const NOT_HUMAN_READABLE: &[&str] = &[
    SYNTAX_AUDIO,
    SYNTAX_BINARY,
    SYNTAX_CERTIFICATE,
    SYNTAX_CERTIFICATE_LIST,
    SYNTAX_CERTIFICATE_PAIR,
    SYNTAX_FAX,
    SYNTAX_JPEG,
    SYNTAX_OCTET_STRING,
];

const BINARY_TRANSFER_REQUIRED: &[&str] = &[
    SYNTAX_CERTIFICATE,
    SYNTAX_CERTIFICATE_LIST,
    SYNTAX_CERTIFICATE_PAIR,
];

/// Resolved object class
#[derive(Debug, Clone)]
pub struct ObjectClass {
    pub oid: String,
    pub name: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub kind: ClassKind,
    pub superiors: Vec<String>,
    pub must: Vec<String>,
    pub may: Vec<String>,
}

/// Resolved attribute type, with syntax inherited through `SUP`
#[derive(Debug, Clone)]
pub struct AttributeType {
    pub oid: String,
    pub name: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub superior: Option<String>,
    pub syntax: Option<String>,
    pub single_value: bool,
    pub read_only: bool,
    pub binary: bool,
    pub binary_required: bool,
}

/// ldapSyntaxes entry
#[derive(Debug, Clone)]
pub struct Syntax {
    pub oid: String,
    pub description: Option<String>,
    pub not_human_readable: bool,
}

/// A MUST attribute together with the class that declares it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredAttribute {
    pub attribute: String,
    pub object_class: String,
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    classes: Vec<ObjectClass>,
    class_index: HashMap<String, usize>,
    /// Ancestor names per class index, nearest first, without the class itself
    ancestors: Vec<Vec<String>>,
    attributes: Vec<AttributeType>,
    attribute_index: HashMap<String, usize>,
    syntaxes: HashMap<String, Syntax>,
}

impl SchemaRegistry {
    /// Build a registry from raw definition strings. Definitions that fail to
    /// parse are skipped with a warning.
    pub fn from_definitions<S: AsRef<str>>(
        object_classes: &[S],
        attribute_types: &[S],
        ldap_syntaxes: &[S],
    ) -> Result<Self> {
        let mut registry = SchemaRegistry::default();

        for raw in ldap_syntaxes {
            match SyntaxDef::parse(raw.as_ref()) {
                Ok(def) => {
                    let syntax = Syntax {
                        not_human_readable: def.not_human_readable
                            || NOT_HUMAN_READABLE.contains(&def.oid.as_str()),
                        oid: def.oid.clone(),
                        description: def.description,
                    };
                    registry.syntaxes.insert(def.oid, syntax);
                }
                Err(e) => warn!("Skipping ldapSyntaxes definition: {}", e),
            }
        }

        let mut attribute_defs = Vec::new();
        for raw in attribute_types {
            match AttributeTypeDef::parse(raw.as_ref()) {
                Ok(def) => attribute_defs.push(def),
                Err(e) => warn!("Skipping attributeTypes definition: {}", e),
            }
        }
        registry.load_attributes(attribute_defs);

        for raw in object_classes {
            match ObjectClassDef::parse(raw.as_ref()) {
                Ok(def) => registry.insert_class(def),
                Err(e) => warn!("Skipping objectClasses definition: {}", e),
            }
        }
        registry.compute_ancestors();

        debug!(
            "Loaded schema: {} object classes, {} attribute types, {} syntaxes",
            registry.classes.len(),
            registry.attributes.len(),
            registry.syntaxes.len()
        );

        Ok(registry)
    }

    /// Build a registry from a schema subentry's attributes.
    pub fn from_subschema(entry: &Attributes) -> Result<Self> {
        Self::from_definitions(
            &entry.texts("objectClasses"),
            &entry.texts("attributeTypes"),
            &entry.texts("ldapSyntaxes"),
        )
    }

    fn load_attributes(&mut self, defs: Vec<AttributeTypeDef>) {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            by_name.insert(def.oid.to_lowercase(), i);
            for name in &def.names {
                by_name.insert(name.to_lowercase(), i);
            }
        }

        for (i, def) in defs.iter().enumerate() {
            let syntax = resolve_syntax(&defs, &by_name, i);
            let binary = syntax
                .as_deref()
                .map(|oid| self.syntax_is_binary(oid))
                .unwrap_or(false);
            let binary_required = syntax
                .as_deref()
                .map(|oid| BINARY_TRANSFER_REQUIRED.contains(&oid))
                .unwrap_or(false);

            let attribute = AttributeType {
                oid: def.oid.clone(),
                name: def.name().to_string(),
                names: def.names.clone(),
                description: def.description.clone(),
                superior: def.superior.clone(),
                single_value: def.single_value,
                read_only: def.no_user_modification,
                syntax,
                binary,
                binary_required,
            };

            let index = self.attributes.len();
            self.attribute_index.insert(attribute.oid.to_lowercase(), index);
            for name in &attribute.names {
                self.attribute_index.insert(name.to_lowercase(), index);
            }
            self.attributes.push(attribute);
        }
    }

    fn syntax_is_binary(&self, oid: &str) -> bool {
        self.syntaxes
            .get(oid)
            .map(|s| s.not_human_readable)
            .unwrap_or_else(|| NOT_HUMAN_READABLE.contains(&oid))
    }

    fn insert_class(&mut self, def: ObjectClassDef) {
        let class = ObjectClass {
            oid: def.oid.clone(),
            name: def.name().to_string(),
            names: def.names.clone(),
            description: def.description,
            kind: def.kind,
            superiors: def.superiors,
            must: def.must,
            may: def.may,
        };
        let index = self.classes.len();
        self.class_index.insert(class.oid.to_lowercase(), index);
        for name in &class.names {
            self.class_index.insert(name.to_lowercase(), index);
        }
        self.classes.push(class);
    }

    /// Walk the superclass DAG once per class. Visited sets make the walk
    /// terminate on cyclic definitions.
    fn compute_ancestors(&mut self) {
        let mut all = Vec::with_capacity(self.classes.len());
        for start in 0..self.classes.len() {
            let mut seen: HashSet<usize> = HashSet::new();
            seen.insert(start);
            let mut order = Vec::new();
            let mut queue: Vec<usize> = self.superior_indexes(start);
            while !queue.is_empty() {
                let mut next = Vec::new();
                for index in queue {
                    if seen.insert(index) {
                        order.push(self.classes[index].name.clone());
                        next.extend(self.superior_indexes(index));
                    }
                }
                queue = next;
            }
            all.push(order);
        }
        self.ancestors = all;
    }

    fn superior_indexes(&self, index: usize) -> Vec<usize> {
        self.classes[index]
            .superiors
            .iter()
            .filter_map(|sup| {
                let found = self.class_index.get(&sup.to_lowercase()).copied();
                if found.is_none() {
                    warn!(
                        "Object class {} names unknown superior {}",
                        self.classes[index].name, sup
                    );
                }
                found
            })
            .collect()
    }

    // ===== Lookups =====

    pub fn object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.class_index
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.classes[i])
    }

    pub fn exist_object_class(&self, name: &str) -> bool {
        self.object_class(name).is_some()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeType> {
        self.attribute_index
            .get(&strip_options(name).to_lowercase())
            .map(|&i| &self.attributes[i])
    }

    pub fn syntax(&self, oid: &str) -> Option<&Syntax> {
        self.syntaxes.get(oid)
    }

    /// Canonical (first) name of an attribute
    pub fn canonical_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name).map(|a| a.name.as_str())
    }

    /// Other names of an attribute, excluding the canonical one
    pub fn attribute_aliases(&self, name: &str) -> Vec<String> {
        self.attribute(name)
            .map(|a| a.names.iter().skip(1).cloned().collect())
            .unwrap_or_default()
    }

    /// Ancestors of a class, nearest first. Unknown classes have none.
    pub fn ancestors(&self, class: &str) -> &[String] {
        self.class_index
            .get(&class.trim().to_lowercase())
            .map(|&i| self.ancestors[i].as_slice())
            .unwrap_or(&[])
    }

    /// Whether `class` equals `other` or has it as an ancestor.
    pub fn is_kind_of(&self, class: &str, other: &str) -> bool {
        class.eq_ignore_ascii_case(other)
            || self
                .ancestors(class)
                .iter()
                .any(|a| a.eq_ignore_ascii_case(other))
            || match (self.object_class(class), self.object_class(other)) {
                (Some(a), Some(b)) => a.oid == b.oid,
                _ => false,
            }
    }

    pub fn is_binary(&self, attribute: &str) -> bool {
        self.attribute(attribute).map(|a| a.binary).unwrap_or(false)
    }

    pub fn is_binary_required(&self, attribute: &str) -> bool {
        self.attribute(attribute)
            .map(|a| a.binary_required)
            .unwrap_or(false)
    }

    /// MUST attributes of the given classes and all their ancestors, each
    /// attribute listed once with the first class declaring it. Unknown
    /// classes contribute nothing.
    pub fn required_attributes<S: AsRef<str>>(&self, classes: &[S]) -> Vec<RequiredAttribute> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for class in classes {
            let class = class.as_ref();
            let Some(oc) = self.object_class(class) else {
                continue;
            };
            let lineage = std::iter::once(oc.name.clone()).chain(self.ancestors(class).iter().cloned());
            for name in lineage {
                let Some(node) = self.object_class(&name) else {
                    continue;
                };
                for attribute in &node.must {
                    let key = self
                        .canonical_attribute(attribute)
                        .unwrap_or(attribute)
                        .to_lowercase();
                    if seen.insert(key) {
                        out.push(RequiredAttribute {
                            attribute: attribute.clone(),
                            object_class: node.name.clone(),
                        });
                    }
                }
            }
        }
        out
    }

    /// MUST and MAY attributes allowed by the given classes
    pub fn allowed_attributes<S: AsRef<str>>(&self, classes: &[S]) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for class in classes {
            let class = class.as_ref();
            let Some(oc) = self.object_class(class) else {
                continue;
            };
            let lineage = std::iter::once(oc.name.clone()).chain(self.ancestors(class).iter().cloned());
            for name in lineage {
                if let Some(node) = self.object_class(&name) {
                    for attribute in node.must.iter().chain(node.may.iter()) {
                        if seen.insert(attribute.to_lowercase()) {
                            out.push(attribute.clone());
                        }
                    }
                }
            }
        }
        out
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &ObjectClass> {
        self.classes.iter()
    }

    pub fn attribute_types(&self) -> impl Iterator<Item = &AttributeType> {
        self.attributes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.attributes.is_empty()
    }
}

/// `userCertificate;binary` → `userCertificate`
pub fn strip_options(attribute: &str) -> &str {
    attribute.split(';').next().unwrap_or(attribute).trim()
}

fn resolve_syntax(
    defs: &[AttributeTypeDef],
    by_name: &HashMap<String, usize>,
    start: usize,
) -> Option<String> {
    let mut seen = HashSet::new();
    let mut current = start;
    loop {
        if !seen.insert(current) {
            return None;
        }
        let def = &defs[current];
        if let Some(syntax) = &def.syntax {
            return Some(syntax.clone());
        }
        let sup = def.superior.as_ref()?;
        current = *by_name.get(&sup.to_lowercase())?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standard;

    #[test]
    fn test_ancestors_are_memoized_and_ordered() {
        let schema = standard::registry();
        assert_eq!(
            schema.ancestors("inetOrgPerson"),
            &["organizationalPerson", "person", "top"]
        );
        assert_eq!(schema.ancestors("INETORGPERSON").len(), 3);
        assert!(schema.ancestors("top").is_empty());
        assert!(schema.ancestors("noSuchClass").is_empty());
        assert!(schema.is_kind_of("inetOrgPerson", "Person"));
        assert!(!schema.is_kind_of("person", "inetOrgPerson"));
    }

    #[test]
    fn test_cyclic_superiors_terminate() {
        let schema = SchemaRegistry::from_definitions(
            &[
                "( 1.1 NAME 'a' SUP b )",
                "( 1.2 NAME 'b' SUP a )",
            ],
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(schema.ancestors("a"), &["b"]);
        assert_eq!(schema.ancestors("b"), &["a"]);
    }

    #[test]
    fn test_attribute_aliases_and_syntax_inheritance() {
        let schema = standard::registry();
        assert_eq!(schema.canonical_attribute("commonName"), Some("cn"));
        assert_eq!(schema.attribute_aliases("cn"), vec!["commonName"]);
        assert_eq!(schema.attribute_aliases("surname"), vec!["surname"]);

        // cn has no SYNTAX of its own and inherits from name
        assert_eq!(
            schema.attribute("cn").unwrap().syntax.as_deref(),
            Some("1.3.6.1.4.1.1466.115.121.1.15")
        );
    }

    #[test]
    fn test_binary_attributes() {
        let schema = standard::registry();
        assert!(schema.is_binary("jpegPhoto"));
        assert!(schema.is_binary("userCertificate"));
        assert!(schema.is_binary("userCertificate;binary"));
        assert!(schema.is_binary_required("userCertificate"));
        assert!(!schema.is_binary_required("jpegPhoto"));
        assert!(!schema.is_binary("cn"));
        assert!(!schema.is_binary("unknownAttr"));
    }

    #[test]
    fn test_not_human_readable_extension() {
        let schema = SchemaRegistry::from_definitions(
            &[] as &[&str],
            &["( 9.9.1 NAME 'blob' SYNTAX 9.9.9 )"],
            &["( 9.9.9 DESC 'Custom' X-NOT-HUMAN-READABLE 'TRUE' )"],
        )
        .unwrap();
        assert!(schema.is_binary("blob"));
        assert_eq!(schema.syntax("9.9.9").unwrap().description.as_deref(), Some("Custom"));
    }

    #[test]
    fn test_required_attributes_include_ancestors() {
        let schema = standard::registry();
        let required = schema.required_attributes(&["inetOrgPerson", "posixAccount"]);
        let names: Vec<&str> = required.iter().map(|r| r.attribute.as_str()).collect();
        assert_eq!(
            names,
            vec!["sn", "cn", "objectClass", "uid", "uidNumber", "gidNumber", "homeDirectory"]
        );
        assert_eq!(required[0].object_class, "person");
        assert_eq!(required[2].object_class, "top");
    }

    #[test]
    fn test_unparsable_definitions_are_skipped() {
        let schema =
            SchemaRegistry::from_definitions(&["garbage", "( 1.1 NAME 'ok' )"], &[], &[]).unwrap();
        assert!(schema.exist_object_class("ok"));
        assert_eq!(schema.object_classes().count(), 1);
    }
}
