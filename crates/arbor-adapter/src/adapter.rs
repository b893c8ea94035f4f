//! Connection adapter
//!
//! The single access point to a directory session. It picks a connect method
//! once at construction, opens and binds the session lazily on first use, and
//! wraps every transport call with logging and error translation.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use arbor_core::config::Endpoint;
use arbor_core::types::{AttributeDelta, AttributeValue, Attributes, Control, ModType, Modification, Scope};
use arbor_core::{BindMode, ConnectionConfig, Error, Result, DEFAULT_SUBSCHEMA_DN};
use arbor_schema::SchemaRegistry;

use crate::ldap::Ldap3Driver;
use crate::method::{connect_method, ConnectMethod};
use crate::transport::{RawEntry, SearchRequest, Transport, TransportDriver, TransportError, TransportResult};

/// Filter used when a search is given none
pub const DEFAULT_FILTER: &str = "(objectClass=*)";

/// Message older transports use to report an empty search
pub const NO_RESULTS_MESSAGE: &str = "no result returned by search";

/// SASL mechanisms that carry a credential
const CREDENTIAL_MECHANISMS: &[&str] = &["DIGEST-MD5", "CRAM-MD5", "PLAIN", "LOGIN"];

const SCHEMA_ATTRIBUTES: &[&str] = &["objectClasses", "attributeTypes", "ldapSyntaxes"];

/// One directory session.
///
/// Operations take `&mut self`; use one adapter per task.
pub struct ConnectionAdapter {
    config: ConnectionConfig,
    endpoint: Endpoint,
    bind_mode: BindMode,
    method: Box<dyn ConnectMethod>,
    driver: Arc<dyn TransportDriver>,
    transport: Option<Box<dyn Transport>>,
    bound: bool,
    schema: Option<Arc<SchemaRegistry>>,
}

impl std::fmt::Debug for ConnectionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAdapter")
            .field("endpoint", &self.identifier())
            .field("bind_mode", &self.bind_mode)
            .field("driver", &self.driver.name())
            .field("connected", &self.transport.is_some())
            .field("bound", &self.bound)
            .finish()
    }
}

impl ConnectionAdapter {
    /// Build an adapter over `driver`. Fails on an unknown connect method or
    /// bind mode.
    pub fn new(config: ConnectionConfig, driver: Arc<dyn TransportDriver>) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let bind_mode = config.bind_mode()?;
        let method = connect_method(endpoint.mode);

        Ok(Self {
            config,
            endpoint,
            bind_mode,
            method,
            driver,
            transport: None,
            bound: false,
            schema: None,
        })
    }

    /// Adapter over the `ldap3` network transport
    pub fn ldap3(config: ConnectionConfig) -> Result<Self> {
        Self::new(config, Arc::new(Ldap3Driver))
    }

    /// `ldap[s]://host:port`, with ` + StartTLS` when upgrading
    pub fn identifier(&self) -> String {
        self.method
            .connect(&self.endpoint.host, self.endpoint.port)
            .identifier()
    }

    pub fn base(&self) -> &str {
        &self.config.base
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Open the transport if it is not open yet.
    pub async fn connect(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Ok(());
        }

        let target = self.method.connect(&self.endpoint.host, self.endpoint.port);
        let start = Instant::now();
        match self.driver.open(&target, &self.config).await {
            Ok(transport) => {
                info!(
                    "Connected to {} ({}) in {:?}",
                    target.identifier(),
                    self.driver.name(),
                    start.elapsed()
                );
                self.transport = Some(transport);
                self.bound = false;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", target.identifier(), e);
                Err(Error::Connection(format!("{}: {}", target.identifier(), e)))
            }
        }
    }

    /// Authenticate with the configured bind mode.
    pub async fn bind(&mut self) -> Result<()> {
        self.connect().await?;

        let result = match self.bind_mode {
            BindMode::Anonymous => self.bind_as_anonymous().await,
            BindMode::Simple => self.simple_bind().await,
            BindMode::Sasl => self.sasl_bind().await,
        };

        match result {
            Ok(()) => {
                self.bound = true;
                info!("Bound to {} ({})", self.identifier(), self.bind_mode);
                Ok(())
            }
            Err(e)
                if self.config.allow_anonymous
                    && self.bind_mode != BindMode::Anonymous
                    && !matches!(e, Error::Connection(_)) =>
            {
                warn!("{} bind failed, falling back to anonymous: {}", self.bind_mode, e);
                self.bind_as_anonymous().await?;
                self.bound = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Unbind and close the session. Does nothing when not bound.
    pub async fn unbind(&mut self) -> Result<()> {
        if !self.bound {
            return Ok(());
        }
        self.bound = false;
        if let Some(mut transport) = self.transport.take() {
            transport
                .unbind()
                .await
                .map_err(|e| Error::Connection(e.to_string()))?;
            debug!("Unbound from {}", self.identifier());
        }
        Ok(())
    }

    /// Unbind if needed and drop the transport.
    pub async fn disconnect(&mut self) -> Result<()> {
        let result = self.unbind().await;
        self.transport = None;
        result
    }

    fn transport_mut(&mut self) -> Result<&mut Box<dyn Transport>> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::Connection("not connected".into()))
    }

    /// Connected and bound transport, opening it on first use.
    async fn session(&mut self) -> Result<&mut Box<dyn Transport>> {
        if self.transport.is_none() {
            self.connect().await?;
        }
        if !self.bound {
            self.bind().await?;
        }
        self.transport_mut()
    }

    async fn bind_as_anonymous(&mut self) -> Result<()> {
        let result = self.transport_mut()?.bind_anonymous().await;
        result.map_err(|e| self.translate("bind", e))
    }

    async fn simple_bind(&mut self) -> Result<()> {
        let dn = self.config.bind_dn.clone().unwrap_or_default();
        let password = self.config.password.clone().unwrap_or_default();
        let result = self.transport_mut()?.simple_bind(&dn, &password).await;
        result.map_err(|e| self.translate("bind", e))
    }

    /// Try each configured mechanism in order until one succeeds.
    async fn sasl_bind(&mut self) -> Result<()> {
        let mechanisms = self.config.sasl_mechanisms.clone();
        let dn = self.config.bind_dn.clone();
        let credential = self
            .config
            .sasl_credential
            .clone()
            .or_else(|| self.config.password.clone());

        let mut last_error = None;
        for mechanism in &mechanisms {
            let credential = if requires_credential(mechanism) {
                credential.as_deref()
            } else {
                None
            };
            let result = self
                .transport_mut()?
                .sasl_bind(dn.as_deref(), mechanism, credential)
                .await;
            match result {
                Ok(()) => {
                    debug!("SASL bind succeeded with {}", mechanism);
                    return Ok(());
                }
                Err(e) => {
                    debug!("SASL bind with {} failed: {}", mechanism, e);
                    last_error = Some(self.translate("bind", e));
                    if self.transport.is_none() {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Configuration("no SASL mechanisms configured".into())
        }))
    }

    /// Map a transport failure to an error, dropping the session when the
    /// server went away so the next call reconnects.
    fn translate(&mut self, operation: &str, error: TransportError) -> Error {
        match error {
            TransportError::ServerDown(message) => {
                warn!("Connection to {} lost during {}: {}", self.identifier(), operation, message);
                self.transport = None;
                self.bound = false;
                Error::Connection(message)
            }
            TransportError::Result { code, message } => {
                Error::from_result_code(operation, code, message)
            }
            TransportError::NoResults => Error::from_result_code(operation, 32, NO_RESULTS_MESSAGE),
            TransportError::Unsupported(message) => Error::Configuration(message),
            TransportError::Other(message) => Error::Transport(message),
        }
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Root DSE attributes, or `None` when the server hides it.
    pub async fn root_dse(&mut self, attributes: &[&str]) -> Result<Option<Attributes>> {
        let request = SearchRequest {
            base: String::new(),
            scope: Scope::Base,
            filter: DEFAULT_FILTER.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        };
        let mut found = None;
        self.raw_search(request, Some(1), &mut |entry: RawEntry| {
            found = Some(entry.attributes)
        })
        .await?;
        Ok(found)
    }

    /// The session schema, loaded from the subschema subentry on first use.
    pub async fn schema(&mut self) -> Result<Arc<SchemaRegistry>> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }

        let subschema = self
            .root_dse(&["subschemaSubentry"])
            .await?
            .and_then(|root| root.first("subschemaSubentry").map(String::from))
            .unwrap_or_else(|| DEFAULT_SUBSCHEMA_DN.to_string());

        let request = SearchRequest {
            base: subschema.clone(),
            scope: Scope::Base,
            filter: "(objectClass=subschema)".to_string(),
            attributes: SCHEMA_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
        };
        let mut entry = Attributes::new();
        self.raw_search(request, Some(1), &mut |raw: RawEntry| entry = raw.attributes)
            .await?;

        let registry = SchemaRegistry::from_subschema(&entry)?;
        info!(
            "Loaded schema from {}: {} object classes, {} attribute types",
            subschema,
            registry.object_classes().count(),
            registry.attribute_types().count()
        );

        let registry = Arc::new(registry);
        self.schema = Some(registry.clone());
        Ok(registry)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Run a search and hand each `(dn, attributes)` pair to `callback`.
    ///
    /// Delivery stops after `limit` entries. A limit of zero means no limit,
    /// as with an LDAP size limit of 0. An empty or missing base yields zero
    /// entries rather than an error. Returns the number delivered.
    pub async fn search<F>(
        &mut self,
        base: &str,
        scope: Scope,
        filter: Option<&str>,
        attributes: &[&str],
        limit: Option<usize>,
        mut callback: F,
    ) -> Result<usize>
    where
        F: FnMut(String, Attributes) + Send,
    {
        let schema = self.schema().await?;
        let filter = match filter.map(str::trim) {
            Some(f) if !f.is_empty() => f.to_string(),
            _ => DEFAULT_FILTER.to_string(),
        };
        let request = SearchRequest {
            base: base.to_string(),
            scope,
            filter,
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        };

        self.raw_search(request, limit, &mut |entry: RawEntry| {
            callback(entry.dn, binary_values(&schema, entry.attributes))
        })
        .await
    }

    /// [`search`](Self::search), collected.
    pub async fn search_entries(
        &mut self,
        base: &str,
        scope: Scope,
        filter: Option<&str>,
        attributes: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<(String, Attributes)>> {
        let mut entries = Vec::new();
        self.search(base, scope, filter, attributes, limit, |dn, attrs| {
            entries.push((dn, attrs))
        })
        .await?;
        Ok(entries)
    }

    /// Whether an entry exists at `dn`.
    pub async fn exists(&mut self, dn: &str) -> Result<bool> {
        let found = self
            .search(dn, Scope::Base, None, &["1.1"], Some(1), |_, _| {})
            .await?;
        Ok(found > 0)
    }

    async fn raw_search(
        &mut self,
        request: SearchRequest,
        limit: Option<usize>,
        deliver: &mut (dyn FnMut(RawEntry) + Send),
    ) -> Result<usize> {
        let start = Instant::now();
        let limit = limit.filter(|&l| l > 0);
        let mut delivered = 0usize;

        let outcome = {
            let transport = self.session().await?;
            let mut sink = |entry: RawEntry| {
                if limit.is_some_and(|l| delivered >= l) {
                    return ControlFlow::Break(());
                }
                deliver(entry);
                delivered += 1;
                if limit.is_some_and(|l| delivered >= l) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            };
            transport.search(&request, &mut sink).await
        };

        match outcome {
            Ok(()) => {
                debug!(
                    "search base={:?} scope={} filter={} -> {} entries ({:?})",
                    request.base,
                    request.scope,
                    request.filter,
                    delivered,
                    start.elapsed()
                );
                Ok(delivered)
            }
            Err(TransportError::NoResults) => {
                debug!("No results for {} under {:?}", request.filter, request.base);
                Ok(delivered)
            }
            Err(TransportError::Other(message)) if message.contains(NO_RESULTS_MESSAGE) => {
                debug!("No results for {} under {:?}", request.filter, request.base);
                Ok(delivered)
            }
            Err(e) => Err(self.translate("search", e)),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create an entry. Every delta is sent as an add.
    pub async fn add(&mut self, dn: &str, deltas: &[AttributeDelta], controls: &[Control]) -> Result<()> {
        let schema = self.schema().await?;
        let mods = modifications(&schema, deltas, true);
        let start = Instant::now();
        let transport = self.session().await?;
        let result = if controls.is_empty() {
            transport.add(dn, &mods).await
        } else {
            transport.add_ext(dn, &mods, controls).await
        };
        self.finish("add", dn, &mods, start, result)
    }

    /// Apply attribute changes to an existing entry.
    pub async fn modify(&mut self, dn: &str, deltas: &[AttributeDelta], controls: &[Control]) -> Result<()> {
        if deltas.is_empty() {
            debug!("modify {}: nothing to change", dn);
            return Ok(());
        }
        let schema = self.schema().await?;
        let mods = modifications(&schema, deltas, false);
        let start = Instant::now();
        let transport = self.session().await?;
        let result = if controls.is_empty() {
            transport.modify(dn, &mods).await
        } else {
            transport.modify_ext(dn, &mods, controls).await
        };
        self.finish("modify", dn, &mods, start, result)
    }

    pub async fn delete(&mut self, dn: &str, controls: &[Control]) -> Result<()> {
        let start = Instant::now();
        let transport = self.session().await?;
        let result = if controls.is_empty() {
            transport.delete(dn).await
        } else {
            transport.delete_ext(dn, controls).await
        };
        self.finish("delete", dn, &[], start, result)
    }

    /// Rename `dn` to `new_rdn`, optionally moving it under `new_superior`.
    pub async fn modify_rdn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
        controls: &[Control],
    ) -> Result<()> {
        let start = Instant::now();
        let transport = self.session().await?;
        let result = if controls.is_empty() {
            transport
                .modify_rdn(dn, new_rdn, delete_old_rdn, new_superior)
                .await
        } else {
            transport
                .modify_rdn_ext(dn, new_rdn, delete_old_rdn, new_superior, controls)
                .await
        };
        self.finish("modify_rdn", dn, &[], start, result)
    }

    fn finish(
        &mut self,
        operation: &str,
        dn: &str,
        mods: &[Modification],
        start: Instant,
        result: TransportResult<()>,
    ) -> Result<()> {
        let elapsed = start.elapsed();
        match result {
            Ok(()) => {
                if mods.is_empty() {
                    debug!("{} {} ({:?})", operation, dn, elapsed);
                } else {
                    debug!("{} {} {} ({:?})", operation, dn, describe(mods), elapsed);
                }
                Ok(())
            }
            Err(e) => {
                debug!("{} {} failed after {:?}: {}", operation, dn, elapsed, e);
                Err(self.translate(operation, e))
            }
        }
    }
}

fn requires_credential(mechanism: &str) -> bool {
    CREDENTIAL_MECHANISMS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(mechanism))
}

/// Values of schema-binary attributes as binary.
fn binary_values(schema: &SchemaRegistry, attributes: Attributes) -> Attributes {
    attributes
        .into_iter()
        .map(|(name, values)| {
            if schema.is_binary(&name) {
                let values: Vec<AttributeValue> =
                    values.into_iter().map(AttributeValue::into_binary).collect();
                (name, values)
            } else {
                (name, values)
            }
        })
        .collect()
}

/// Resolve binary marking and transfer options for a set of deltas.
pub fn modifications(schema: &SchemaRegistry, deltas: &[AttributeDelta], force_add: bool) -> Vec<Modification> {
    deltas
        .iter()
        .map(|delta| {
            let binary = schema.is_binary(&delta.attribute)
                || delta.values.iter().any(AttributeValue::is_binary);
            let attribute = if schema.is_binary_required(&delta.attribute) && !delta.attribute.contains(';') {
                format!("{};binary", delta.attribute)
            } else {
                delta.attribute.clone()
            };
            let values = if binary {
                delta.values.iter().cloned().map(AttributeValue::into_binary).collect()
            } else {
                delta.values.clone()
            };
            Modification {
                op: if force_add { ModType::Add } else { delta.op },
                attribute,
                values,
                binary,
            }
        })
        .collect()
}

fn describe(mods: &[Modification]) -> String {
    mods.iter()
        .map(|m| format!("{} {}: {:?}", m.op, m.attribute, m.display_values()))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDirectory;
    use arbor_core::types::TREE_DELETE_OID;
    use arbor_schema::standard;

    const BASE: &str = "dc=example,dc=com";

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            base: BASE.into(),
            ..Default::default()
        }
    }

    fn adapter(directory: &MemoryDirectory, config: ConnectionConfig) -> ConnectionAdapter {
        ConnectionAdapter::new(config, Arc::new(directory.clone())).unwrap()
    }

    fn people(directory: &MemoryDirectory, count: usize) {
        let mut ou = Attributes::new();
        ou.set("objectClass", ["top", "organizationalUnit"]);
        ou.set("ou", ["People"]);
        directory.insert(&format!("ou=People,{}", BASE), ou);
        for i in 0..count {
            let mut person = Attributes::new();
            person.set("objectClass", ["top", "person"]);
            person.set("cn", [format!("user{}", i)]);
            person.set("sn", ["Test"]);
            directory.insert(&format!("cn=user{},ou=People,{}", i, BASE), person);
        }
    }

    #[tokio::test]
    async fn test_session_opens_lazily() {
        let directory = MemoryDirectory::with_base(BASE);
        let mut adapter = adapter(&directory, config());
        assert!(!adapter.is_connected());
        assert_eq!(adapter.identifier(), "ldap://127.0.0.1:389");

        assert!(adapter.exists(BASE).await.unwrap());
        assert!(adapter.is_connected() && adapter.is_bound());
        assert_eq!(directory.count("bind"), 1);
        assert_eq!(directory.targets().len(), 1);
    }

    #[tokio::test]
    async fn test_search_limit_and_no_results() {
        let directory = MemoryDirectory::with_base(BASE);
        people(&directory, 5);
        let mut adapter = adapter(&directory, config());

        let mut seen = Vec::new();
        let delivered = adapter
            .search(BASE, Scope::Sub, Some("(objectClass=person)"), &[], Some(2), |dn, _| seen.push(dn))
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(seen.len(), 2);

        let all = adapter
            .search_entries(BASE, Scope::One, Some("(ou=People)"), &["ou"], None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1.texts("ou"), vec!["People"]);
        assert!(!all[0].1.contains("objectClass"));

        let missing = adapter
            .search_entries("ou=Nowhere,dc=example,dc=com", Scope::Sub, None, &[], None)
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_is_unlimited() {
        let directory = MemoryDirectory::with_base(BASE);
        people(&directory, 3);
        let mut adapter = adapter(&directory, config());

        let entries = adapter
            .search_entries(BASE, Scope::Sub, Some("(objectClass=person)"), &[], Some(0))
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_legacy_no_results_message() {
        let directory = MemoryDirectory::with_base(BASE);
        let mut adapter = adapter(&directory, config());
        adapter.schema().await.unwrap();

        directory.fail_next(TransportError::Other(NO_RESULTS_MESSAGE.into()));
        let found = adapter
            .search_entries(BASE, Scope::Sub, None, &[], None)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_server_disconnect_becomes_connection_error() {
        let directory = MemoryDirectory::with_base(BASE);
        let mut adapter = adapter(&directory, config());
        adapter.schema().await.unwrap();

        directory.fail_next(TransportError::ServerDown("connection reset by peer".into()));
        let err = adapter
            .search_entries(BASE, Scope::Sub, None, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Connection(m) if m.contains("reset by peer")));
        assert!(!adapter.is_connected());

        assert!(adapter.exists(BASE).await.unwrap());
        assert_eq!(directory.targets().len(), 2);
    }

    #[tokio::test]
    async fn test_controls_route_to_extended_operations() {
        let directory = MemoryDirectory::with_base(BASE);
        people(&directory, 2);
        let mut adapter = adapter(&directory, config());

        adapter
            .delete(&format!("cn=user0,ou=People,{}", BASE), &[])
            .await
            .unwrap();
        adapter
            .delete(&format!("ou=People,{}", BASE), &[Control::new(TREE_DELETE_OID)])
            .await
            .unwrap();

        assert_eq!(directory.count("delete"), 1);
        assert_eq!(directory.count("delete_ext"), 1);
        assert!(!directory.contains(&format!("cn=user1,ou=People,{}", BASE)));
    }

    #[tokio::test]
    async fn test_write_errors_are_translated() {
        let directory = MemoryDirectory::with_base(BASE);
        people(&directory, 1);
        let mut adapter = adapter(&directory, config());
        let dn = format!("cn=user0,ou=People,{}", BASE);

        let err = adapter
            .add(&dn, &[AttributeDelta::add("objectClass", ["person"])], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EntryAlreadyExists(_)));

        let err = adapter
            .modify("cn=ghost,dc=example,dc=com", &[AttributeDelta::replace("sn", ["x"])], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EntryNotFound(_)));

        let err = adapter
            .delete(&format!("ou=People,{}", BASE), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Operation { code: 66, .. }));
    }

    #[tokio::test]
    async fn test_rename_moves_entry() {
        let directory = MemoryDirectory::with_base(BASE);
        people(&directory, 1);
        let mut adapter = adapter(&directory, config());

        adapter
            .modify_rdn(&format!("cn=user0,ou=People,{}", BASE), "cn=renamed", true, Some(BASE), &[])
            .await
            .unwrap();
        let entry = directory.entry(&format!("cn=renamed,{}", BASE)).unwrap();
        assert_eq!(entry.texts("cn"), vec!["renamed"]);
        assert_eq!(directory.count("modify_rdn"), 1);
    }

    #[tokio::test]
    async fn test_unbind_is_noop_when_not_bound() {
        let directory = MemoryDirectory::with_base(BASE);
        let mut adapter = adapter(&directory, config());

        adapter.unbind().await.unwrap();
        assert_eq!(directory.count("unbind"), 0);

        adapter.bind().await.unwrap();
        adapter.unbind().await.unwrap();
        assert_eq!(directory.count("unbind"), 1);
        assert!(!adapter.is_bound());

        adapter.disconnect().await.unwrap();
        assert_eq!(directory.count("unbind"), 1);
    }

    #[tokio::test]
    async fn test_simple_bind_and_anonymous_fallback() {
        let directory = MemoryDirectory::with_base(BASE);
        directory.add_credentials("cn=admin,dc=example,dc=com", "secret");

        let mut good = adapter(
            &directory,
            ConnectionConfig {
                bind_mode: "simple".into(),
                bind_dn: Some("cn=admin,dc=example,dc=com".into()),
                password: Some("secret".into()),
                ..config()
            },
        );
        good.bind().await.unwrap();

        let wrong = ConnectionConfig {
            bind_mode: "simple".into(),
            bind_dn: Some("cn=admin,dc=example,dc=com".into()),
            password: Some("nope".into()),
            ..config()
        };
        let err = adapter(&directory, wrong.clone()).bind().await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));

        let mut fallback = adapter(
            &directory,
            ConnectionConfig {
                allow_anonymous: true,
                ..wrong
            },
        );
        fallback.bind().await.unwrap();
        assert!(fallback.is_bound());
    }

    #[tokio::test]
    async fn test_sasl_credential_only_for_credential_mechanisms() {
        let directory = MemoryDirectory::with_base(BASE);
        directory.enable_sasl("DIGEST-MD5");
        let mut adapter = adapter(
            &directory,
            ConnectionConfig {
                bind_mode: "sasl".into(),
                sasl_mechanisms: vec!["EXTERNAL".into(), "DIGEST-MD5".into()],
                sasl_credential: Some("pw".into()),
                ..config()
            },
        );

        adapter.bind().await.unwrap();
        assert_eq!(
            directory.sasl_attempts(),
            vec![
                ("EXTERNAL".to_string(), None),
                ("DIGEST-MD5".to_string(), Some("pw".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_connection_failures() {
        let directory = MemoryDirectory::new();
        directory.set_unreachable(true);
        let mut adapter = adapter(&directory, config());
        assert!(matches!(adapter.connect().await, Err(Error::Connection(_))));

        let bad = ConnectionConfig {
            method: "carrier-pigeon".into(),
            ..config()
        };
        assert!(matches!(
            ConnectionAdapter::new(bad, Arc::new(directory.clone())),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_binary_attributes() {
        let directory = MemoryDirectory::with_base(BASE);
        let mut adapter = adapter(&directory, config());
        let dn = format!("uid=bob,{}", BASE);

        adapter
            .add(
                &dn,
                &[
                    AttributeDelta::add("objectClass", ["top", "person", "uidObject"]),
                    AttributeDelta::add("uid", ["bob"]),
                    AttributeDelta::add("cn", ["Bob"]),
                    AttributeDelta::add("sn", ["Dobbs"]),
                    AttributeDelta::add("userPassword", ["{SSHA}abc"]),
                ],
                &[],
            )
            .await
            .unwrap();

        let found = adapter
            .search_entries(&dn, Scope::Base, None, &[], None)
            .await
            .unwrap();
        let password = &found[0].1.get("userPassword").unwrap()[0];
        assert!(matches!(password, AttributeValue::Binary(b) if b == b"{SSHA}abc"));
        assert_eq!(found[0].1.first("cn"), Some("Bob"));
    }

    #[test]
    fn test_binary_transfer_option() {
        let schema = standard::registry();
        let mods = modifications(
            &schema,
            &[
                AttributeDelta::replace("userCertificate", [b"\x30\x82".to_vec()]),
                AttributeDelta::replace("cn", ["Bob"]),
            ],
            false,
        );
        assert_eq!(mods[0].attribute, "userCertificate;binary");
        assert!(mods[0].binary);
        assert_eq!(mods[0].op, ModType::Replace);
        assert_eq!(mods[1].attribute, "cn");
        assert!(!mods[1].binary);
    }
}
