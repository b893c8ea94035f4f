//! Arbor Adapter
//!
//! Directory sessions: connect methods, the transport seam, the `ldap3`
//! network transport, and the [`ConnectionAdapter`] that ties them together.
//! The in-memory directory used by tests is behind the `testing` feature.

pub mod adapter;
pub mod ldap;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod method;
pub mod transport;

pub use adapter::ConnectionAdapter;
pub use ldap::Ldap3Driver;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryDirectory;
pub use method::{connect_method, ConnectMethod, ConnectTarget};
pub use transport::{RawEntry, SearchRequest, Transport, TransportDriver, TransportError};
