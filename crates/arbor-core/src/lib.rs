//! Arbor Core Library
//!
//! Core types, configuration, filter compilation and DN handling for the
//! Arbor directory mapping engine.

pub mod config;
pub mod dn;
pub mod error;
pub mod filter;
pub mod types;

pub use config::{ArborConfig, BindMode, ConnectionConfig, TransportMode};
pub use dn::Dn;
pub use error::{Error, Result};
pub use filter::Filter;

/// Arbor version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Attribute holding entry object classes
pub const OBJECT_CLASS: &str = "objectClass";

/// Schema subentry used when the root DSE does not advertise one
pub const DEFAULT_SUBSCHEMA_DN: &str = "cn=schema";
