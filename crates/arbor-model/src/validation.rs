//! Required attribute checks run before every save

use arbor_core::types::{Attributes, ValidationError, ValidationErrors};
use arbor_core::{Error, Result, OBJECT_CLASS};
use arbor_schema::SchemaRegistry;

/// Check that every MUST attribute of the entry's classes and their
/// ancestors has a value.
///
/// Each missing attribute is reported once, against the first class that
/// requires it. A MUST attribute the schema does not define is an error of
/// its own rather than a validation failure.
pub fn validate(schema: &SchemaRegistry, attributes: &Attributes) -> Result<ValidationErrors> {
    let classes = attributes.texts(OBJECT_CLASS);
    let mut errors = ValidationErrors::new();

    for required in schema.required_attributes(&classes) {
        let attribute = schema
            .attribute(&required.attribute)
            .ok_or_else(|| Error::UnknownAttribute(required.attribute.clone()))?;

        let present = attribute.names.iter().any(|name| attributes.is_present(name));
        if !present {
            errors.push(ValidationError {
                attribute: attribute.name.clone(),
                object_class: required.object_class.clone(),
                aliases: schema.attribute_aliases(&attribute.name),
            });
        }
    }

    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_schema::standard;

    fn attrs(pairs: &[(&str, &[&str])]) -> Attributes {
        pairs.iter().map(|(k, v)| (*k, v.iter().copied())).collect()
    }

    #[test]
    fn test_missing_attributes_are_accumulated() {
        let schema = standard::registry();
        let errors = validate(
            &schema,
            &attrs(&[("objectClass", &["top", "person", "posixAccount"]), ("uid", &["bob"])]),
        )
        .unwrap();

        let missing: Vec<&str> = errors.iter().map(|e| e.attribute.as_str()).collect();
        assert_eq!(missing, vec!["sn", "cn", "uidNumber", "gidNumber", "homeDirectory"]);
        assert_eq!(errors.on("cn")[0].object_class, "person");
        assert_eq!(errors.on("cn")[0].aliases, vec!["commonName"]);
        assert!(errors.on("uidNumber")[0].aliases.is_empty());
    }

    #[test]
    fn test_alias_and_blank_values() {
        let schema = standard::registry();
        let errors = validate(
            &schema,
            &attrs(&[("objectClass", &["person"]), ("commonName", &["Bob"]), ("sn", &[""])]),
        )
        .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.full_messages(),
            vec!["sn is required attribute by objectClass 'person': aliases: surname"]
        );
    }

    #[test]
    fn test_unknown_must_attribute() {
        let schema = SchemaRegistry::from_definitions(
            &["( 1.1.1 NAME 'odd' MUST ( ghost ) )"],
            &[] as &[&str],
            &[] as &[&str],
        )
        .unwrap();
        let result = validate(&schema, &attrs(&[("objectClass", &["odd"])]));
        assert!(matches!(result, Err(Error::UnknownAttribute(name)) if name == "ghost"));
    }
}
