//! Connect methods
//!
//! Plain, SSL (`ldaps://`) and StartTLS. One is picked from the configured
//! transport mode when the adapter is built.

use std::fmt;

use arbor_core::TransportMode;

/// Where and how to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub start_tls: bool,
}

impl ConnectTarget {
    /// `ldap://host:port` or `ldaps://host:port`
    pub fn url(&self) -> String {
        let scheme = if self.ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Connection identifier used in logs
    pub fn identifier(&self) -> String {
        if self.start_tls {
            format!("{} + StartTLS", self.url())
        } else {
            self.url()
        }
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

pub trait ConnectMethod: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn is_ssl(&self) -> bool;

    fn is_start_tls(&self) -> bool;

    fn connect(&self, host: &str, port: u16) -> ConnectTarget {
        ConnectTarget {
            host: host.to_string(),
            port,
            ssl: self.is_ssl(),
            start_tls: self.is_start_tls(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl ConnectMethod for Plain {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn is_ssl(&self) -> bool {
        false
    }

    fn is_start_tls(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ssl;

impl ConnectMethod for Ssl {
    fn name(&self) -> &'static str {
        "ssl"
    }

    fn is_ssl(&self) -> bool {
        true
    }

    fn is_start_tls(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Tls;

impl ConnectMethod for Tls {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn is_ssl(&self) -> bool {
        false
    }

    fn is_start_tls(&self) -> bool {
        true
    }
}

pub fn connect_method(mode: TransportMode) -> Box<dyn ConnectMethod> {
    match mode {
        TransportMode::Plain => Box::new(Plain),
        TransportMode::Ssl => Box::new(Ssl),
        TransportMode::Tls => Box::new(Tls),
    }
}
