//! In-memory directory
//!
//! A small LDAP-like server held in process memory. It serves the same
//! [`Transport`] contract as the network transport and is seeded with a root
//! DSE and the standard schema. Every request is recorded so callers can
//! assert on the traffic an operation produced.

mod matcher;

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use arbor_core::dn::Dn;
use arbor_core::types::{AttributeValue, Attributes, Control, ModType, Modification, Scope, TREE_DELETE_OID};
use arbor_core::ConnectionConfig;
use arbor_schema::registry::strip_options;
use arbor_schema::standard;

use crate::method::ConnectTarget;
use crate::transport::{
    EntrySink, RawEntry, SearchRequest, Transport, TransportDriver, TransportError,
    TransportResult,
};

pub use matcher::FilterNode;

/// DN of the seeded schema subentry
pub const SUBSCHEMA_DN: &str = "cn=Subschema";

/// One request seen by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    /// Operation name; control-carrying variants end in `_ext`
    pub name: String,
    pub dn: String,
    pub filter: Option<String>,
    pub controls: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    attributes: Attributes,
}

#[derive(Debug, Default)]
struct DirectoryState {
    /// Keyed by normalized DN
    entries: BTreeMap<String, StoredEntry>,
    passwords: HashMap<String, String>,
    sasl_mechanisms: Vec<String>,
    sasl_attempts: Vec<(String, Option<String>)>,
    operations: Vec<OperationRecord>,
    targets: Vec<ConnectTarget>,
    pending_failure: Option<TransportError>,
    unreachable: bool,
}

impl DirectoryState {
    fn record(&mut self, name: &str, dn: &str, filter: Option<&str>, controls: &[Control]) {
        self.operations.push(OperationRecord {
            name: name.to_string(),
            dn: dn.to_string(),
            filter: filter.map(String::from),
            controls: controls.iter().map(|c| c.oid.clone()).collect(),
        });
    }

    fn take_failure(&mut self) -> TransportResult<()> {
        match self.pending_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn contains(&self, dn: &Dn) -> bool {
        self.entries.contains_key(&dn.normalized())
    }

    fn has_children(&self, dn: &Dn) -> bool {
        self.entries.values().any(|e| {
            Dn::parse(&e.dn)
                .map(|d| d.parent().as_ref() == Some(dn))
                .unwrap_or(false)
        })
    }
}

/// Shared handle to an in-memory directory. Clones see the same data.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    /// Directory holding only the root DSE and the standard schema subentry.
    pub fn new() -> Self {
        let directory = Self {
            state: Arc::new(Mutex::new(DirectoryState::default())),
        };

        let mut schema = Attributes::new();
        schema.set("objectClass", ["top", "subentry", "subschema"]);
        schema.set("cn", ["Subschema"]);
        schema.set("objectClasses", standard::OBJECT_CLASSES.iter().copied());
        schema.set("attributeTypes", standard::ATTRIBUTE_TYPES.iter().copied());
        schema.set("ldapSyntaxes", standard::LDAP_SYNTAXES.iter().copied());
        directory.insert(SUBSCHEMA_DN, schema);

        directory.set_root_dse(Vec::new());
        directory
    }

    /// Directory with a `dcObject` naming context at `base`.
    pub fn with_base(base: &str) -> Self {
        let directory = Self::new();
        let dc = Dn::parse(base)
            .ok()
            .and_then(|dn| dn.rdn().and_then(|r| r.value_of("dc")).map(String::from))
            .unwrap_or_default();
        let mut attributes = Attributes::new();
        attributes.set("objectClass", ["top", "dcObject", "organization"]);
        attributes.set("dc", [dc.as_str()]);
        attributes.set("o", [dc.as_str()]);
        directory.insert(base, attributes);
        directory.set_root_dse(vec![base.to_string()]);
        directory
    }

    fn set_root_dse(&self, naming_contexts: Vec<String>) {
        let mut root = Attributes::new();
        root.set("objectClass", ["top"]);
        root.set("subschemaSubentry", [SUBSCHEMA_DN]);
        root.set("supportedLDAPVersion", ["3"]);
        root.set("namingContexts", naming_contexts);
        self.insert("", root);
    }

    /// Store an entry directly, bypassing every check.
    pub fn insert(&self, dn: &str, attributes: Attributes) {
        let key = Dn::parse(dn).map(|d| d.normalized()).unwrap_or_else(|_| dn.to_lowercase());
        self.state.lock().entries.insert(
            key,
            StoredEntry {
                dn: dn.to_string(),
                attributes,
            },
        );
    }

    pub fn entry(&self, dn: &str) -> Option<Attributes> {
        let key = Dn::parse(dn).ok()?.normalized();
        self.state.lock().entries.get(&key).map(|e| e.attributes.clone())
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.entry(dn).is_some()
    }

    /// Accept simple binds for `dn` with `password`.
    pub fn add_credentials(&self, dn: &str, password: &str) {
        let key = Dn::parse(dn).map(|d| d.normalized()).unwrap_or_else(|_| dn.to_lowercase());
        self.state.lock().passwords.insert(key, password.to_string());
    }

    /// Accept SASL binds with `mechanism`.
    pub fn enable_sasl(&self, mechanism: &str) {
        self.state.lock().sasl_mechanisms.push(mechanism.to_ascii_uppercase());
    }

    /// Mechanism and credential of every SASL bind attempt
    pub fn sasl_attempts(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().sasl_attempts.clone()
    }

    /// Make the next request fail with `error`.
    pub fn fail_next(&self, error: TransportError) {
        self.state.lock().pending_failure = Some(error);
    }

    /// Refuse new connections.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn operations(&self) -> Vec<OperationRecord> {
        self.state.lock().operations.clone()
    }

    /// Number of recorded requests named `name`
    pub fn count(&self, name: &str) -> usize {
        self.state
            .lock()
            .operations
            .iter()
            .filter(|op| op.name == name)
            .count()
    }

    pub fn clear_operations(&self) {
        self.state.lock().operations.clear();
    }

    /// Targets of every connection opened so far
    pub fn targets(&self) -> Vec<ConnectTarget> {
        self.state.lock().targets.clone()
    }
}

#[async_trait]
impl TransportDriver for MemoryDirectory {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(
        &self,
        target: &ConnectTarget,
        _config: &ConnectionConfig,
    ) -> TransportResult<Box<dyn Transport>> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(TransportError::ServerDown(format!(
                "Can't contact LDAP server: {}",
                target.identifier()
            )));
        }
        state.targets.push(target.clone());
        Ok(Box::new(MemoryTransport {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

/// One session against a [`MemoryDirectory`]
pub struct MemoryTransport {
    state: Arc<Mutex<DirectoryState>>,
    closed: bool,
}

fn parse_dn(dn: &str) -> TransportResult<Dn> {
    Dn::parse(dn).map_err(|e| TransportError::result(34, e.to_string()))
}

fn no_such_object(dn: &str) -> TransportError {
    TransportError::result(32, format!("No such object: {}", dn))
}

impl MemoryTransport {
    fn begin(
        &self,
        name: &str,
        dn: &str,
        filter: Option<&str>,
        controls: &[Control],
    ) -> TransportResult<parking_lot::MutexGuard<'_, DirectoryState>> {
        let mut state = self.state.lock();
        state.record(name, dn, filter, controls);
        if self.closed {
            return Err(TransportError::ServerDown("connection closed".into()));
        }
        state.take_failure()?;
        Ok(state)
    }

    fn do_search(
        &self,
        request: &SearchRequest,
    ) -> TransportResult<Vec<RawEntry>> {
        let state = self.begin("search", &request.base, Some(&request.filter), &[])?;
        let filter = FilterNode::parse(&request.filter)?;
        let base = parse_dn(&request.base)?;
        if !state.contains(&base) {
            return Err(TransportError::NoResults);
        }

        let mut found = Vec::new();
        for entry in state.entries.values() {
            let Ok(dn) = Dn::parse(&entry.dn) else {
                continue;
            };
            let in_scope = match request.scope {
                Scope::Base => dn == base,
                Scope::One => dn.parent().as_ref() == Some(&base),
                // The root DSE is only visible to base-scope searches
                Scope::Sub => !dn.is_empty() && dn.ends_with(&base),
            };
            if in_scope && filter.matches(&entry.attributes) {
                found.push(RawEntry {
                    dn: entry.dn.clone(),
                    attributes: select(&entry.attributes, &request.attributes),
                });
            }
        }

        if found.is_empty() {
            Err(TransportError::NoResults)
        } else {
            Ok(found)
        }
    }

    fn do_add(
        &self,
        name: &str,
        dn: &str,
        attributes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()> {
        let mut state = self.begin(name, dn, None, controls)?;
        let parsed = parse_dn(dn)?;
        if state.contains(&parsed) {
            return Err(TransportError::result(68, format!("Already exists: {}", dn)));
        }
        if let Some(parent) = parsed.parent() {
            if !parent.is_empty() && !state.contains(&parent) {
                return Err(no_such_object(&parent.to_string()));
            }
        }

        let mut stored = Attributes::new();
        for m in attributes {
            stored.append(strip_options(&m.attribute), m.values.iter().cloned());
        }
        if !stored.contains("objectClass") {
            return Err(TransportError::result(65, "no objectClass attribute"));
        }
        state.entries.insert(
            parsed.normalized(),
            StoredEntry {
                dn: dn.to_string(),
                attributes: stored,
            },
        );
        Ok(())
    }

    fn do_modify(
        &self,
        name: &str,
        dn: &str,
        changes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()> {
        let mut state = self.begin(name, dn, None, controls)?;
        let key = parse_dn(dn)?.normalized();
        let entry = state.entries.get_mut(&key).ok_or_else(|| no_such_object(dn))?;

        let mut attributes = entry.attributes.clone();
        for m in changes {
            let attribute = strip_options(&m.attribute);
            match m.op {
                ModType::Add => {
                    if let Some(existing) = attributes.get(attribute) {
                        if m.values.iter().any(|v| existing.contains(v)) {
                            return Err(TransportError::result(
                                20,
                                format!("{}: value already exists", attribute),
                            ));
                        }
                    }
                    attributes.append(attribute, m.values.iter().cloned());
                }
                ModType::Replace => attributes.set(attribute, m.values.iter().cloned()),
                ModType::Delete => {
                    let Some(existing) = attributes.get(attribute) else {
                        return Err(TransportError::result(
                            16,
                            format!("{}: no such attribute", attribute),
                        ));
                    };
                    if m.values.is_empty() {
                        attributes.remove(attribute);
                    } else {
                        let kept: Vec<AttributeValue> = existing
                            .iter()
                            .filter(|v| !m.values.contains(v))
                            .cloned()
                            .collect();
                        attributes.set(attribute, kept);
                    }
                }
            }
        }
        entry.attributes = attributes;
        Ok(())
    }

    fn do_delete(&self, name: &str, dn: &str, controls: &[Control]) -> TransportResult<()> {
        let mut state = self.begin(name, dn, None, controls)?;
        let parsed = parse_dn(dn)?;
        if !state.contains(&parsed) {
            return Err(no_such_object(dn));
        }
        let tree_delete = controls.iter().any(|c| c.oid == TREE_DELETE_OID);
        if state.has_children(&parsed) {
            if !tree_delete {
                return Err(TransportError::result(66, format!("Entry has children: {}", dn)));
            }
            state.entries.retain(|_, e| {
                Dn::parse(&e.dn)
                    .map(|d| !d.is_descendant_of(&parsed))
                    .unwrap_or(true)
            });
        }
        state.entries.remove(&parsed.normalized());
        Ok(())
    }

    fn do_modify_rdn(
        &self,
        name: &str,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
        controls: &[Control],
    ) -> TransportResult<()> {
        let mut state = self.begin(name, dn, None, controls)?;
        let old = parse_dn(dn)?;
        let mut entry = state
            .entries
            .get(&old.normalized())
            .cloned()
            .ok_or_else(|| no_such_object(dn))?;

        let rdn = new_rdn
            .parse::<arbor_core::dn::Rdn>()
            .map_err(|e| TransportError::result(34, e.to_string()))?;
        let superior = match new_superior {
            Some(s) => parse_dn(s)?,
            None => old.parent().unwrap_or_default(),
        };
        if !superior.is_empty() && !state.contains(&superior) {
            return Err(no_such_object(&superior.to_string()));
        }
        let moved = superior.child(rdn.clone());
        if moved != old && state.contains(&moved) {
            return Err(TransportError::result(68, format!("Already exists: {}", moved)));
        }

        if delete_old_rdn {
            if let Some(old_rdn) = old.rdn() {
                for ava in &old_rdn.avas {
                    let kept: Vec<AttributeValue> = entry
                        .attributes
                        .get(&ava.attribute)
                        .unwrap_or(&[])
                        .iter()
                        .filter(|v| !v.to_string().eq_ignore_ascii_case(&ava.value))
                        .cloned()
                        .collect();
                    entry.attributes.set(&ava.attribute, kept);
                }
            }
        }
        for ava in &rdn.avas {
            entry.attributes.append(&ava.attribute, [ava.value.as_str()]);
        }

        // Re-key the entry and everything below it
        let subtree: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| {
                Dn::parse(&e.dn)
                    .map(|d| d.is_descendant_of(&old))
                    .unwrap_or(false)
            })
            .map(|(k, _)| k.clone())
            .collect();
        for key in subtree {
            if let Some(mut child) = state.entries.remove(&key) {
                if let Ok(child_dn) = Dn::parse(&child.dn) {
                    let relative = &child_dn.rdns()[..child_dn.len() - old.len()];
                    let renamed = Dn::from_rdns(relative.to_vec()).join(&moved);
                    child.dn = renamed.to_string();
                    state.entries.insert(renamed.normalized(), child);
                }
            }
        }

        state.entries.remove(&old.normalized());
        entry.dn = moved.to_string();
        state.entries.insert(moved.normalized(), entry);
        Ok(())
    }
}

/// Project an entry onto the requested attribute list.
fn select(attributes: &Attributes, requested: &[String]) -> Attributes {
    if requested.is_empty() || requested.iter().any(|a| a == "*") {
        return attributes.clone();
    }
    let mut out = Attributes::new();
    for (name, values) in attributes.iter() {
        if requested.iter().any(|r| r.eq_ignore_ascii_case(name)) {
            out.set(name, values.iter().cloned());
        }
    }
    out
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn bind_anonymous(&mut self) -> TransportResult<()> {
        let _state = self.begin("bind", "", None, &[])?;
        Ok(())
    }

    async fn simple_bind(&mut self, dn: &str, password: &str) -> TransportResult<()> {
        let state = self.begin("bind", dn, None, &[])?;
        if dn.is_empty() && password.is_empty() {
            return Ok(());
        }
        if password.is_empty() {
            return Err(TransportError::result(53, "unauthenticated bind (DN with no password) disallowed"));
        }
        let key = parse_dn(dn)?.normalized();
        match state.passwords.get(&key) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(TransportError::result(49, "Invalid credentials")),
        }
    }

    async fn sasl_bind(
        &mut self,
        dn: Option<&str>,
        mechanism: &str,
        credential: Option<&str>,
    ) -> TransportResult<()> {
        let mut state = self.begin("sasl_bind", dn.unwrap_or(""), None, &[])?;
        state
            .sasl_attempts
            .push((mechanism.to_string(), credential.map(String::from)));
        if state
            .sasl_mechanisms
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mechanism))
        {
            Ok(())
        } else {
            Err(TransportError::result(7, format!("SASL mechanism {} not supported", mechanism)))
        }
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
        sink: &mut EntrySink<'_>,
    ) -> TransportResult<()> {
        let entries = self.do_search(request)?;
        let total = entries.len();
        let mut delivered = 0;
        for entry in entries {
            delivered += 1;
            if let ControlFlow::Break(()) = sink(entry) {
                break;
            }
        }
        if delivered < total {
            debug!("Discarded {} search results past the limit", total - delivered);
        }
        Ok(())
    }

    async fn add(&mut self, dn: &str, attributes: &[Modification]) -> TransportResult<()> {
        self.do_add("add", dn, attributes, &[])
    }

    async fn add_ext(
        &mut self,
        dn: &str,
        attributes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()> {
        self.do_add("add_ext", dn, attributes, controls)
    }

    async fn modify(&mut self, dn: &str, changes: &[Modification]) -> TransportResult<()> {
        self.do_modify("modify", dn, changes, &[])
    }

    async fn modify_ext(
        &mut self,
        dn: &str,
        changes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()> {
        self.do_modify("modify_ext", dn, changes, controls)
    }

    async fn delete(&mut self, dn: &str) -> TransportResult<()> {
        self.do_delete("delete", dn, &[])
    }

    async fn delete_ext(&mut self, dn: &str, controls: &[Control]) -> TransportResult<()> {
        self.do_delete("delete_ext", dn, controls)
    }

    async fn modify_rdn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> TransportResult<()> {
        self.do_modify_rdn("modify_rdn", dn, new_rdn, delete_old_rdn, new_superior, &[])
    }

    async fn modify_rdn_ext(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
        controls: &[Control],
    ) -> TransportResult<()> {
        self.do_modify_rdn("modify_rdn_ext", dn, new_rdn, delete_old_rdn, new_superior, controls)
    }

    async fn unbind(&mut self) -> TransportResult<()> {
        self.state.lock().record("unbind", "", None, &[]);
        self.closed = true;
        Ok(())
    }
}
