//! Transport seam
//!
//! A [`Transport`] is one open protocol session. A [`TransportDriver`] opens
//! sessions for a [`ConnectTarget`]. The adapter only talks to these traits.

use std::ops::ControlFlow;

use async_trait::async_trait;
use thiserror::Error;

use arbor_core::types::{Attributes, Control, Modification, Scope};
use arbor_core::ConnectionConfig;

use crate::method::ConnectTarget;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failure reported by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The search matched nothing (or its base does not exist)
    #[error("no result returned by search")]
    NoResults,

    /// The server closed the session or could not be reached
    #[error("{0}")]
    ServerDown(String),

    /// The server answered with a non-success result code
    #[error("result code {code}: {message}")]
    Result { code: u32, message: String },

    /// The transport cannot perform the request at all
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn result(code: u32, message: impl Into<String>) -> Self {
        TransportError::Result {
            code,
            message: message.into(),
        }
    }
}

/// One search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: Scope,
    pub filter: String,
    /// Requested attributes; empty means all user attributes
    pub attributes: Vec<String>,
}

/// A search result entry as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub dn: String,
    pub attributes: Attributes,
}

/// Receives search results. Returning `Break` stops delivery; the transport
/// still reads (and discards) the rest of the response.
pub type EntrySink<'a> = dyn FnMut(RawEntry) -> ControlFlow<()> + Send + 'a;

#[async_trait]
pub trait Transport: Send {
    async fn bind_anonymous(&mut self) -> TransportResult<()>;

    async fn simple_bind(&mut self, dn: &str, password: &str) -> TransportResult<()>;

    /// SASL bind; `credential` is `None` for mechanisms that take none.
    async fn sasl_bind(
        &mut self,
        dn: Option<&str>,
        mechanism: &str,
        credential: Option<&str>,
    ) -> TransportResult<()>;

    async fn search(
        &mut self,
        request: &SearchRequest,
        sink: &mut EntrySink<'_>,
    ) -> TransportResult<()>;

    async fn add(&mut self, dn: &str, attributes: &[Modification]) -> TransportResult<()>;

    async fn add_ext(
        &mut self,
        dn: &str,
        attributes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()>;

    async fn modify(&mut self, dn: &str, changes: &[Modification]) -> TransportResult<()>;

    async fn modify_ext(
        &mut self,
        dn: &str,
        changes: &[Modification],
        controls: &[Control],
    ) -> TransportResult<()>;

    async fn delete(&mut self, dn: &str) -> TransportResult<()>;

    async fn delete_ext(&mut self, dn: &str, controls: &[Control]) -> TransportResult<()>;

    async fn modify_rdn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> TransportResult<()>;

    async fn modify_rdn_ext(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
        controls: &[Control],
    ) -> TransportResult<()>;

    async fn unbind(&mut self) -> TransportResult<()>;
}

/// Opens transports
#[async_trait]
pub trait TransportDriver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(
        &self,
        target: &ConnectTarget,
        config: &ConnectionConfig,
    ) -> TransportResult<Box<dyn Transport>>;
}
