//! Belongs-to associations
//!
//! The owner entry stores a foreign key; the related entry is looked up
//! through another [`Mapping`] on first read and cached on the owner until
//! it is replaced, reset or the owner is reloaded.

use std::sync::Arc;

use tracing::debug;

use arbor_adapter::ConnectionAdapter;
use arbor_core::types::Attributes;
use arbor_core::{Error, Filter, Result};
use arbor_schema::SchemaRegistry;

use crate::entry::MappedEntry;
use crate::mapping::Mapping;

/// Primary key meaning "the related entry's DN"
pub const DN_KEY: &str = "dn";

#[derive(Debug, Clone)]
pub struct BelongsTo {
    pub name: String,
    /// Owner attribute holding the reference
    pub foreign_key: String,
    /// Attribute of the related entry the foreign key refers to
    pub primary_key: String,
    pub target: Arc<Mapping>,
}

/// Per-owner state of one association
#[derive(Debug, Clone, Default)]
pub struct AssociationCache {
    pub(crate) target: Option<Box<MappedEntry>>,
    pub(crate) updated: bool,
}

impl BelongsTo {
    /// Reference by DN, stored in an attribute named after the association
    pub fn new(name: impl Into<String>, target: Arc<Mapping>) -> Self {
        let name = name.into();
        Self {
            foreign_key: name.clone(),
            name,
            primary_key: DN_KEY.to_string(),
            target,
        }
    }

    pub fn foreign_key(mut self, attribute: impl Into<String>) -> Self {
        self.foreign_key = attribute.into();
        self
    }

    pub fn primary_key(mut self, attribute: impl Into<String>) -> Self {
        self.primary_key = attribute.into();
        self
    }

    /// The same relation with the foreign key under its canonical schema name.
    fn canonical(&self, schema: &SchemaRegistry) -> Self {
        let mut relation = self.clone();
        if let Some(name) = schema.canonical_attribute(&self.foreign_key) {
            relation.foreign_key = name.to_string();
        }
        relation
    }

    fn by_dn(&self) -> bool {
        self.primary_key.eq_ignore_ascii_case(DN_KEY)
    }

    fn key_of(&self, target: &MappedEntry) -> Option<String> {
        if self.by_dn() {
            Some(target.dn().to_string())
        } else {
            target.first(&self.primary_key).map(String::from)
        }
    }

    /// Point `owner` at `target`, or clear the reference with `None`.
    ///
    /// The foreign key is only written when the target already exists in the
    /// directory; an unsaved target is cached without touching the owner.
    pub fn replace(&self, cache: &mut AssociationCache, owner: &mut Attributes, target: Option<MappedEntry>) {
        match target {
            None => {
                cache.target = None;
                owner.remove(&self.foreign_key);
            }
            Some(target) => {
                if !target.is_new() {
                    match self.key_of(&target) {
                        Some(key) => owner.set(&self.foreign_key, [key]),
                        None => {
                            owner.remove(&self.foreign_key);
                        }
                    }
                }
                cache.target = Some(Box::new(target));
                cache.updated = true;
            }
        }
    }

    /// Look up the related entry named by the owner's foreign key.
    pub async fn find_target(&self, adapter: &mut ConnectionAdapter, owner: &Attributes) -> Result<MappedEntry> {
        let key = owner.first(&self.foreign_key).ok_or_else(|| {
            Error::EntryNotFound(format!("{} has no {}", self.name, self.foreign_key))
        })?;
        debug!("Loading {} through {}={}", self.name, self.primary_key, key);

        if self.by_dn() {
            return self.target.find(adapter, key).await;
        }

        let filter = Filter::eq(self.primary_key.as_str(), key);
        self.target
            .find_all(adapter, Some(filter), Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EntryNotFound(format!("{}: no entry with {}={}", self.name, self.primary_key, key)))
    }
}

impl MappedEntry {
    /// Set or clear a belongs-to reference.
    pub fn set_association(&mut self, name: &str, target: Option<MappedEntry>) -> Result<()> {
        let relation = self.mapping().association(name)?.canonical(self.schema());
        let mut cache = self.associations.remove(name).unwrap_or_default();
        relation.replace(&mut cache, &mut self.attributes, target);
        self.associations.insert(name.to_string(), cache);
        Ok(())
    }

    /// The related entry, loaded on first access.
    pub async fn association(&mut self, adapter: &mut ConnectionAdapter, name: &str) -> Result<&MappedEntry> {
        let relation = self.mapping().association(name)?.canonical(self.schema());
        let cached = self
            .associations
            .get(name)
            .map(|c| c.target.is_some())
            .unwrap_or(false);

        if !cached {
            let target = relation.find_target(adapter, &self.attributes).await?;
            self.associations.entry(name.to_string()).or_default().target = Some(Box::new(target));
        }

        self.associations
            .get(name)
            .and_then(|c| c.target.as_deref())
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }

    /// Whether the association was replaced since it was last loaded
    pub fn association_updated(&self, name: &str) -> bool {
        self.associations.get(name).map(|c| c.updated).unwrap_or(false)
    }

    /// Forget the cached related entry.
    pub fn reset_association(&mut self, name: &str) {
        self.associations.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{directory, groups, users};
    use arbor_core::types::AttributeDelta;

    #[tokio::test]
    async fn test_lookup_is_cached() {
        let (directory, mut adapter) = directory();
        let users = users(&groups());
        let mut bob = users.find(&mut adapter, "bob").await.unwrap();

        directory.clear_operations();
        let group = bob.association(&mut adapter, "primary_group").await.unwrap();
        assert_eq!(group.dn(), "cn=staff,ou=Groups,dc=example,dc=com");
        bob.association(&mut adapter, "primary_group").await.unwrap();
        assert_eq!(directory.count("search"), 1);

        bob.reset_association("primary_group");
        bob.association(&mut adapter, "primary_group").await.unwrap();
        assert_eq!(directory.count("search"), 2);
    }

    #[tokio::test]
    async fn test_unsaved_target_does_not_set_foreign_key() {
        let (_directory, mut adapter) = directory();
        let groups = groups();
        let users = users(&groups);
        let mut bob = users.find(&mut adapter, "bob").await.unwrap();

        let mut wheel = groups.new_entry(&mut adapter, "wheel").await.unwrap();
        wheel.set("gidNumber", ["10"]);
        bob.set_association("primary_group", Some(wheel.clone())).unwrap();
        assert_eq!(bob.first("gidNumber"), Some("100"));
        assert!(bob.association_updated("primary_group"));
        assert_eq!(
            bob.association(&mut adapter, "primary_group").await.unwrap().dn(),
            wheel.dn()
        );

        wheel.save(&mut adapter).await.unwrap();
        bob.set_association("primary_group", Some(wheel)).unwrap();
        assert_eq!(bob.first("gidNumber"), Some("10"));
    }

    #[tokio::test]
    async fn test_dn_reference_and_clear() {
        let (directory, mut adapter) = directory();
        let groups = groups();
        let users = users(&groups);
        let mut bob = users.find(&mut adapter, "bob").await.unwrap();
        let alice = users.find(&mut adapter, "alice").await.unwrap();

        bob.set_association("manager", Some(alice.clone())).unwrap();
        assert_eq!(bob.first("seeAlso"), Some(alice.dn()));
        bob.save(&mut adapter).await.unwrap();

        bob.reload(&mut adapter).await.unwrap();
        directory.clear_operations();
        let manager = bob.association(&mut adapter, "manager").await.unwrap();
        assert_eq!(manager.id().as_deref(), Some("alice"));
        assert_eq!(directory.count("search"), 1);

        bob.set_association("manager", None).unwrap();
        assert!(bob.first("seeAlso").is_none());
        assert!(matches!(
            bob.association(&mut adapter, "manager").await,
            Err(Error::EntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_aliased_foreign_key_writes_canonical_attribute() {
        let (_directory, mut adapter) = directory();
        let people = Arc::new(
            Mapping::new("uid")
                .prefix("ou=People")
                .classes(["top", "person"]),
        );
        let namesakes = Arc::new(
            Mapping::new("uid")
                .prefix("ou=People")
                .classes(["top", "person"])
                .belongs_to(
                    BelongsTo::new("namesake", people.clone())
                        .foreign_key("surname")
                        .primary_key("sn"),
                ),
        );
        let mut bob = namesakes.find(&mut adapter, "bob").await.unwrap();
        let alice = people.find(&mut adapter, "alice").await.unwrap();

        bob.set_association("namesake", Some(alice)).unwrap();
        assert_eq!(bob.first("sn"), Some("Liddell"));
        assert!(!bob.attributes().names().any(|n| n == "surname"));
        assert_eq!(bob.changes(), vec![AttributeDelta::replace("sn", ["Liddell"])]);

        bob.save(&mut adapter).await.unwrap();
        bob.reset_association("namesake");
        let namesake = bob.association(&mut adapter, "namesake").await.unwrap();
        assert_eq!(namesake.first("sn"), Some("Liddell"));
    }

    #[tokio::test]
    async fn test_unknown_association() {
        let (_directory, mut adapter) = directory();
        let users = users(&groups());
        let mut bob = users.find(&mut adapter, "bob").await.unwrap();
        assert!(matches!(
            bob.set_association("nope", None),
            Err(Error::Configuration(_))
        ));
    }
}
