//! Mapped entries
//!
//! A [`MappedEntry`] is the in-memory copy of one directory object: its DN,
//! its attributes, and the snapshot taken when it was last loaded or saved.
//! Writes go through [`MappedEntry::save`], which validates the entry, turns
//! the difference from the snapshot into attribute deltas and sends them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use arbor_adapter::ConnectionAdapter;
use arbor_core::types::{AttributeDelta, AttributeValue, Attributes, ModType, Scope};
use arbor_core::{Error, Result};
use arbor_schema::SchemaRegistry;

use crate::association::AssociationCache;
use crate::mapping::Mapping;
use crate::validation;

#[derive(Debug, Clone)]
pub struct MappedEntry {
    mapping: Arc<Mapping>,
    schema: Arc<SchemaRegistry>,
    dn: String,
    pub(crate) attributes: Attributes,
    snapshot: Attributes,
    new_entry: bool,
    pub(crate) associations: HashMap<String, AssociationCache>,
}

impl MappedEntry {
    /// Unsaved entry
    pub fn new(mapping: Arc<Mapping>, schema: Arc<SchemaRegistry>, dn: String, attributes: Attributes) -> Self {
        let attributes = canonicalize(&schema, attributes);
        Self {
            mapping,
            schema,
            dn,
            attributes,
            snapshot: Attributes::new(),
            new_entry: true,
            associations: HashMap::new(),
        }
    }

    /// Entry read from the directory
    pub fn loaded(mapping: Arc<Mapping>, schema: Arc<SchemaRegistry>, dn: String, attributes: Attributes) -> Self {
        let attributes = canonicalize(&schema, attributes);
        Self {
            mapping,
            schema,
            dn,
            snapshot: attributes.clone(),
            attributes,
            new_entry: false,
            associations: HashMap::new(),
        }
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Value of the mapping's DN attribute
    pub fn id(&self) -> Option<String> {
        self.mapping.id_of(&self.dn)
    }

    pub fn mapping(&self) -> &Arc<Mapping> {
        &self.mapping
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn is_new(&self) -> bool {
        self.new_entry
    }

    fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.schema.canonical_attribute(name).unwrap_or(name)
    }

    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(self.resolve(name))
    }

    /// First text value of an attribute
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attributes.first(self.resolve(name))
    }

    /// Replace the values of an attribute. An empty list removes it.
    pub fn set<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        let name = self.resolve(name).to_string();
        self.attributes.set(&name, values);
    }

    pub fn append<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        let name = self.resolve(name).to_string();
        self.attributes.append(&name, values);
    }

    pub fn remove(&mut self, name: &str) {
        let name = self.resolve(name).to_string();
        self.attributes.remove(&name);
    }

    /// Whether attributes differ from the last loaded or saved state.
    pub fn is_changed(&self) -> bool {
        self.new_entry || self.attributes != self.snapshot
    }

    /// Deltas turning the snapshot into the current attributes.
    pub fn changes(&self) -> Vec<AttributeDelta> {
        if self.new_entry {
            return self
                .attributes
                .iter()
                .map(|(name, values)| AttributeDelta::new(ModType::Add, name, values.iter().cloned()))
                .collect();
        }

        let mut deltas = Vec::new();
        for (name, values) in self.attributes.iter() {
            let before = self.snapshot.get(name).unwrap_or(&[]);
            if !same_values(before, values) {
                deltas.push(AttributeDelta::replace(name, values.iter().cloned()));
            }
        }
        for name in self.snapshot.names() {
            if !self.attributes.contains(name) {
                deltas.push(AttributeDelta::clear(name));
            }
        }
        deltas
    }

    /// Validate the entry without writing.
    pub fn validate(&self) -> Result<()> {
        let errors = validation::validate(&self.schema, &self.attributes)?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::EntryInvalid(errors))
        }
    }

    /// Validate, then add or modify the entry.
    pub async fn save(&mut self, adapter: &mut ConnectionAdapter) -> Result<()> {
        self.validate()?;

        let deltas = self.changes();
        if self.new_entry {
            adapter.add(&self.dn, &deltas, &[]).await?;
            self.new_entry = false;
        } else if deltas.is_empty() {
            debug!("{} unchanged, nothing to save", self.dn);
        } else {
            adapter.modify(&self.dn, &deltas, &[]).await?;
        }

        self.snapshot = self.attributes.clone();
        Ok(())
    }

    /// Re-read the entry, dropping local changes and association caches.
    pub async fn reload(&mut self, adapter: &mut ConnectionAdapter) -> Result<()> {
        let mut found = adapter
            .search_entries(&self.dn, Scope::Base, None, &[], Some(1))
            .await?;
        let (_, attributes) = found
            .pop()
            .ok_or_else(|| Error::EntryNotFound(self.dn.clone()))?;

        self.attributes = canonicalize(&self.schema, attributes);
        self.snapshot = self.attributes.clone();
        self.new_entry = false;
        self.associations.clear();
        Ok(())
    }

    /// Delete the entry from the directory. The local copy becomes new again.
    pub async fn destroy(&mut self, adapter: &mut ConnectionAdapter) -> Result<()> {
        adapter.delete(&self.dn, &[]).await?;
        self.new_entry = true;
        self.snapshot = Attributes::new();
        Ok(())
    }
}

/// Rename attributes to their canonical schema names, merging aliases.
fn canonicalize(schema: &SchemaRegistry, attributes: Attributes) -> Attributes {
    attributes
        .into_iter()
        .map(|(name, values)| {
            let name = schema
                .canonical_attribute(&name)
                .map(String::from)
                .unwrap_or(name);
            (name, values)
        })
        .collect()
}

fn same_values(a: &[AttributeValue], b: &[AttributeValue]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{directory, groups, users};

    #[tokio::test]
    async fn test_person_requires_surname() {
        let (directory, mut adapter) = directory();
        let people = Arc::new(Mapping::new("cn").prefix("ou=People").classes(["top", "person"]));

        let mut entry = people.new_entry(&mut adapter, "Alice").await.unwrap();
        match entry.save(&mut adapter).await {
            Err(Error::EntryInvalid(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(
                    errors.full_messages(),
                    vec!["sn is required attribute by objectClass 'person': aliases: surname"]
                );
            }
            other => panic!("expected EntryInvalid, got {:?}", other),
        }
        assert_eq!(directory.count("add"), 0);

        entry.set("surname", ["Liddell"]);
        entry.save(&mut adapter).await.unwrap();
        assert!(!entry.is_new());

        let saved = entry.attributes().clone();
        entry.reload(&mut adapter).await.unwrap();
        assert_eq!(entry.attributes(), &saved);
        assert_eq!(entry.first("sn"), Some("Liddell"));
    }

    #[tokio::test]
    async fn test_save_sends_only_changes() {
        let (directory, mut adapter) = directory();
        let users = users(&groups());
        let mut bob = users.find(&mut adapter, "bob").await.unwrap();

        bob.save(&mut adapter).await.unwrap();
        assert_eq!(directory.count("modify"), 0);

        bob.set("loginShell", ["/bin/zsh"]);
        bob.remove("description");
        assert!(bob.is_changed());
        let changes = bob.changes();
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&AttributeDelta::replace("loginShell", ["/bin/zsh"])));
        assert!(changes.contains(&AttributeDelta::clear("description")));

        bob.save(&mut adapter).await.unwrap();
        assert_eq!(directory.count("modify"), 1);
        assert!(!bob.is_changed());

        let stored = directory.entry(bob.dn()).unwrap();
        assert_eq!(stored.texts("loginShell"), vec!["/bin/zsh"]);
        assert!(!stored.contains("description"));
    }

    #[tokio::test]
    async fn test_aliases_resolve_to_canonical_names() {
        let (_directory, mut adapter) = directory();
        let users = users(&groups());
        let mut bob = users.find(&mut adapter, "bob").await.unwrap();

        assert_eq!(bob.first("commonName"), bob.first("cn"));
        bob.set("userid", ["bob"]);
        assert!(!bob.is_changed());
    }

    #[tokio::test]
    async fn test_destroy_and_reload_missing() {
        let (directory, mut adapter) = directory();
        let groups = groups();
        let mut staff = groups.find(&mut adapter, "staff").await.unwrap();

        staff.destroy(&mut adapter).await.unwrap();
        assert!(staff.is_new());
        assert!(!directory.contains(staff.dn()));
        assert!(matches!(
            staff.reload(&mut adapter).await,
            Err(Error::EntryNotFound(_))
        ));
    }
}
