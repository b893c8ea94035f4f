//! Mapping declarations
//!
//! A [`Mapping`] ties a kind of entry to a place in the directory: the
//! attribute naming its entries, the subtree they live in, and the object
//! classes every entry must carry.

use std::sync::Arc;

use arbor_adapter::ConnectionAdapter;
use arbor_core::dn::{escape_dn_value, Dn, Rdn};
use arbor_core::types::{Attributes, Scope};
use arbor_core::{Error, Filter, Result, OBJECT_CLASS};
use arbor_schema::SchemaRegistry;

use crate::association::BelongsTo;
use crate::entry::MappedEntry;

#[derive(Debug, Clone)]
pub struct Mapping {
    /// Attribute forming the leftmost RDN
    pub dn_attribute: String,
    /// Location below the connection base, e.g. `ou=People`
    pub prefix: String,
    pub scope: Scope,
    /// Classes every entry must carry
    pub classes: Vec<String>,
    /// Classes added to new entries and by `ensure_recommended_classes`
    pub recommended_classes: Vec<String>,
    pub associations: Vec<BelongsTo>,
}

impl Mapping {
    pub fn new(dn_attribute: impl Into<String>) -> Self {
        Self {
            dn_attribute: dn_attribute.into(),
            prefix: String::new(),
            scope: Scope::Sub,
            classes: vec!["top".to_string()],
            recommended_classes: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn recommended_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommended_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn belongs_to(mut self, association: BelongsTo) -> Self {
        self.associations.push(association);
        self
    }

    pub fn association(&self, name: &str) -> Result<&BelongsTo> {
        self.associations
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::Configuration(format!("unknown association: {}", name)))
    }

    /// Search base: the prefix joined onto the connection base.
    pub fn base(&self, connection_base: &str) -> String {
        match (self.prefix.is_empty(), connection_base.is_empty()) {
            (true, _) => connection_base.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{},{}", self.prefix, connection_base),
        }
    }

    /// DN of the entry with the given id.
    pub fn dn_for(&self, id: &str, connection_base: &str) -> String {
        let base = self.base(connection_base);
        let rdn = format!("{}={}", self.dn_attribute, escape_dn_value(id));
        if base.is_empty() {
            rdn
        } else {
            format!("{},{}", rdn, base)
        }
    }

    /// Whether `value` names an entry by DN rather than by id.
    pub fn is_dn(&self, value: &str) -> bool {
        value.contains('=') && Dn::parse(value).map(|dn| !dn.is_empty()).unwrap_or(false)
    }

    /// Equality clauses for every required class
    pub fn class_filter(&self) -> Filter {
        Filter::and(self.classes.iter().map(|c| Filter::eq(OBJECT_CLASS, c.as_str())))
    }

    fn scoped_filter(&self, filter: Option<Filter>) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(filter) = filter {
            parts.push(filter);
        }
        parts.push(self.class_filter());
        Filter::and(parts).compile()
    }

    /// Look up one entry by id or DN.
    pub async fn find(self: &Arc<Self>, adapter: &mut ConnectionAdapter, key: &str) -> Result<MappedEntry> {
        let (base, scope, filter) = if self.is_dn(key) {
            (key.to_string(), Scope::Base, self.scoped_filter(None))
        } else {
            (
                self.base(adapter.base()),
                self.scope,
                self.scoped_filter(Some(Filter::eq(self.dn_attribute.as_str(), key))),
            )
        };

        let schema = adapter.schema().await?;
        let mut found = adapter
            .search_entries(&base, scope, filter.as_deref(), &[], Some(1))
            .await?;
        match found.pop() {
            Some((dn, attributes)) => Ok(self.instantiate(schema, dn, attributes)),
            None => Err(Error::EntryNotFound(format!(
                "Couldn't find {} with {}: {}",
                self.classes.join(", "),
                if self.is_dn(key) { "DN" } else { self.dn_attribute.as_str() },
                key
            ))),
        }
    }

    /// Entries under the mapping base matching `filter` and the required classes.
    pub async fn find_all(
        self: &Arc<Self>,
        adapter: &mut ConnectionAdapter,
        filter: Option<Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<MappedEntry>> {
        let schema = adapter.schema().await?;
        let found = self.search(adapter, filter, &[], limit).await?;
        Ok(found
            .into_iter()
            .map(|(dn, attributes)| self.instantiate(schema.clone(), dn, attributes))
            .collect())
    }

    /// Raw `(dn, attributes)` pairs under the mapping base.
    pub async fn search(
        &self,
        adapter: &mut ConnectionAdapter,
        filter: Option<Filter>,
        attributes: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<(String, Attributes)>> {
        let base = self.base(adapter.base());
        let filter = self.scoped_filter(filter);
        adapter
            .search_entries(&base, self.scope, filter.as_deref(), attributes, limit)
            .await
    }

    pub async fn exists(self: &Arc<Self>, adapter: &mut ConnectionAdapter, key: &str) -> Result<bool> {
        match self.find(adapter, key).await {
            Ok(_) => Ok(true),
            Err(Error::EntryNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Unsaved entry with the required and recommended classes.
    pub async fn new_entry(self: &Arc<Self>, adapter: &mut ConnectionAdapter, id: &str) -> Result<MappedEntry> {
        let schema = adapter.schema().await?;
        let dn = self.dn_for(id, adapter.base());

        let mut classes: Vec<String> = Vec::new();
        for class in self.classes.iter().chain(self.recommended_classes.iter()) {
            if !classes.iter().any(|c| c.eq_ignore_ascii_case(class)) {
                classes.push(class.clone());
            }
        }
        let mut attributes = Attributes::new();
        attributes.set(OBJECT_CLASS, classes);
        attributes.set(&self.dn_attribute, [id]);

        Ok(MappedEntry::new(self.clone(), schema, dn, attributes))
    }

    /// Delete the entry with the given id or DN.
    pub async fn delete(&self, adapter: &mut ConnectionAdapter, key: &str) -> Result<()> {
        let dn = if self.is_dn(key) {
            key.to_string()
        } else {
            self.dn_for(key, adapter.base())
        };
        adapter.delete(&dn, &[]).await
    }

    /// Wrap a loaded entry.
    pub fn instantiate(
        self: &Arc<Self>,
        schema: Arc<SchemaRegistry>,
        dn: String,
        attributes: Attributes,
    ) -> MappedEntry {
        MappedEntry::loaded(self.clone(), schema, dn, attributes)
    }

    /// The id carried in the leftmost RDN of `dn`
    pub fn id_of(&self, dn: &str) -> Option<String> {
        let dn = Dn::parse(dn).ok()?;
        dn.rdn()
            .and_then(|rdn: &Rdn| rdn.value_of(&self.dn_attribute))
            .map(String::from)
    }
}
