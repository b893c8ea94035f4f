//! `ldap3` transport
//!
//! Opens real LDAP sessions over plain TCP, LDAPS or StartTLS.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::controls::RawControl;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, SearchEntry};
use tracing::debug;

use arbor_core::types::{AttributeValue, Attributes, Control, ModType, Modification, Scope};
use arbor_core::ConnectionConfig;

use crate::method::ConnectTarget;
use crate::transport::{
    EntrySink, RawEntry, SearchRequest, Transport, TransportDriver, TransportError,
    TransportResult,
};

/// Driver opening `ldap3` sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Driver;

#[async_trait]
impl TransportDriver for Ldap3Driver {
    fn name(&self) -> &'static str {
        "ldap3"
    }

    async fn open(
        &self,
        target: &ConnectTarget,
        config: &ConnectionConfig,
    ) -> TransportResult<Box<dyn Transport>> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(config.timeout_seconds))
            .set_starttls(target.start_tls)
            .set_no_tls_verify(config.skip_tls_verify);

        debug!("Connecting to LDAP server: {}", target.identifier());

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &target.url())
            .await
            .map_err(|e| TransportError::ServerDown(format!("Failed to connect: {}", e)))?;

        ldap3::drive!(conn);

        Ok(Box::new(Ldap3Transport { ldap }))
    }
}

/// One `ldap3` session
pub struct Ldap3Transport {
    ldap: Ldap,
}

fn map_error(e: LdapError) -> TransportError {
    match e {
        LdapError::LdapResult { result } => TransportError::result(result.rc, result.text),
        LdapError::Io { .. }
        | LdapError::EndOfStream
        | LdapError::OpSend { .. }
        | LdapError::ResultRecv { .. } => TransportError::ServerDown(e.to_string()),
        other => TransportError::Other(other.to_string()),
    }
}

fn check(result: Result<LdapResult, LdapError>) -> TransportResult<()> {
    let result = result.map_err(map_error)?;
    if result.rc == 0 {
        Ok(())
    } else {
        Err(TransportError::result(result.rc, result.text))
    }
}

fn ldap_scope(scope: Scope) -> ldap3::Scope {
    match scope {
        Scope::Base => ldap3::Scope::Base,
        Scope::One => ldap3::Scope::OneLevel,
        Scope::Sub => ldap3::Scope::Subtree,
    }
}

fn raw_controls(controls: &[Control]) -> Vec<RawControl> {
    controls
        .iter()
        .map(|c| RawControl {
            ctype: c.oid.clone(),
            crit: c.critical,
            val: c.value.clone(),
        })
        .collect()
}

fn value_set(values: &[AttributeValue]) -> HashSet<Vec<u8>> {
    values.iter().map(|v| v.as_bytes().to_vec()).collect()
}

fn add_attributes(attributes: &[Modification]) -> Vec<(Vec<u8>, HashSet<Vec<u8>>)> {
    attributes
        .iter()
        .map(|m| (m.attribute.as_bytes().to_vec(), value_set(&m.values)))
        .collect()
}

fn mods(changes: &[Modification]) -> Vec<Mod<Vec<u8>>> {
    changes
        .iter()
        .map(|m| {
            let name = m.attribute.as_bytes().to_vec();
            let values = value_set(&m.values);
            match m.op {
                ModType::Add => Mod::Add(name, values),
                ModType::Delete => Mod::Delete(name, values),
                ModType::Replace => Mod::Replace(name, values),
            }
        })
        .collect()
}

fn entry_attributes(entry: SearchEntry) -> RawEntry {
    let mut attributes = Attributes::new();
    for (name, values) in entry.attrs {
        attributes.append(&name, values);
    }
    for (name, values) in entry.bin_attrs {
        attributes.append(&name, values.into_iter().map(AttributeValue::Binary));
    }
    RawEntry {
        dn: entry.dn,
        attributes,
    }
}

#[async_trait]
impl Transport for Ldap3Transport {
    async fn bind_anonymous(&mut self) -> TransportResult<()> {
        check(self.ldap.simple_bind("", "").await)
    }

    async fn simple_bind(&mut self, dn: &str, password: &str) -> TransportResult<()> {
        check(self.ldap.simple_bind(dn, password).await)
    }

    async fn sasl_bind(
        &mut self,
        _dn: Option<&str>,
        mechanism: &str,
        _credential: Option<&str>,
    ) -> TransportResult<()> {
        if mechanism.eq_ignore_ascii_case("EXTERNAL") {
            check(self.ldap.sasl_external_bind().await)
        } else {
            Err(TransportError::Unsupported(format!(
                "SASL mechanism {} is not available with the ldap3 transport",
                mechanism
            )))
        }
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
        sink: &mut EntrySink<'_>,
    ) -> TransportResult<()> {
        let mut stream = self
            .ldap
            .streaming_search(
                &request.base,
                ldap_scope(request.scope),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(map_error)?;

        let mut delivering = true;
        let mut discarded = 0usize;
        loop {
            let next = stream.next().await.map_err(map_error)?;
            let Some(entry) = next else {
                break;
            };
            if !delivering {
                discarded += 1;
                continue;
            }
            let entry = entry_attributes(SearchEntry::construct(entry));
            if let ControlFlow::Break(()) = sink(entry) {
                delivering = false;
            }
        }
        if discarded > 0 {
            debug!("Discarded {} search results past the limit", discarded);
        }

        let result = stream.finish().await;
        match result.rc {
            0 => Ok(()),
            32 => Err(TransportError::NoResults),
            rc => Err(TransportError::result(rc, result.text)),
        }
    }

    async fn add(&mut self, dn: &str, attributes: &[Modification]) -> TransportResult<()> {
        check(self.ldap.add(dn, add_attributes(attributes)).await)
    }

    async fn add_ext(
        &mut self,
        dn: &str,
        attributes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()> {
        check(
            self.ldap
                .with_controls(raw_controls(controls))
                .add(dn, add_attributes(attributes))
                .await,
        )
    }

    async fn modify(&mut self, dn: &str, changes: &[Modification]) -> TransportResult<()> {
        check(self.ldap.modify(dn, mods(changes)).await)
    }

    async fn modify_ext(
        &mut self,
        dn: &str,
        changes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()> {
        check(
            self.ldap
                .with_controls(raw_controls(controls))
                .modify(dn, mods(changes))
                .await,
        )
    }

    async fn delete(&mut self, dn: &str) -> TransportResult<()> {
        check(self.ldap.delete(dn).await)
    }

    async fn delete_ext(&mut self, dn: &str, controls: &[Control]) -> TransportResult<()> {
        check(
            self.ldap
                .with_controls(raw_controls(controls))
                .delete(dn)
                .await,
        )
    }

    async fn modify_rdn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> TransportResult<()> {
        check(
            self.ldap
                .modifydn(dn, new_rdn, delete_old_rdn, new_superior)
                .await,
        )
    }

    async fn modify_rdn_ext(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
        controls: &[Control],
    ) -> TransportResult<()> {
        check(
            self.ldap
                .with_controls(raw_controls(controls))
                .modifydn(dn, new_rdn, delete_old_rdn, new_superior)
                .await,
        )
    }

    async fn unbind(&mut self) -> TransportResult<()> {
        self.ldap.unbind().await.map_err(map_error)
    }
}
