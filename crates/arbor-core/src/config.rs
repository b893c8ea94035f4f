//! Configuration for Arbor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArborConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ArborConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `ARBOR_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) {
        let conn = &mut self.connection;

        if let Ok(url) = std::env::var("ARBOR_URL") {
            conn.url = Some(url);
        }
        if let Ok(host) = std::env::var("ARBOR_HOST") {
            conn.host = host;
        }
        if let Ok(port) = std::env::var("ARBOR_PORT") {
            if let Ok(p) = port.parse() {
                conn.port = Some(p);
            }
        }
        if let Ok(method) = std::env::var("ARBOR_METHOD") {
            conn.method = method;
        }
        if let Ok(base) = std::env::var("ARBOR_BASE") {
            conn.base = base;
        }
        if let Ok(bind) = std::env::var("ARBOR_BIND_MODE") {
            conn.bind_mode = bind;
        }
        if let Ok(dn) = std::env::var("ARBOR_BIND_DN") {
            conn.bind_dn = Some(dn);
        }
        if let Ok(password) = std::env::var("ARBOR_PASSWORD") {
            conn.password = Some(password);
        }
        if let Ok(mechs) = std::env::var("ARBOR_SASL_MECHANISMS") {
            conn.sasl_mechanisms = mechs
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if std::env::var("ARBOR_ALLOW_ANONYMOUS").map(|v| v == "true").unwrap_or(false) {
            conn.allow_anonymous = true;
        }
        if std::env::var("ARBOR_SKIP_TLS_VERIFY").map(|v| v == "true").unwrap_or(false) {
            conn.skip_tls_verify = true;
        }
        if let Ok(level) = std::env::var("ARBOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ARBOR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        self.logging.validate()
    }
}

// ============================================================================
// Transport and bind modes
// ============================================================================

/// How the session is secured on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Plain,
    /// LDAP over TLS (`ldaps://`)
    Ssl,
    /// StartTLS upgrade of a plain connection
    Tls,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Plain => "plain",
            TransportMode::Ssl => "ssl",
            TransportMode::Tls => "tls",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            TransportMode::Ssl => 636,
            _ => 389,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(TransportMode::Plain),
            "ssl" => Ok(TransportMode::Ssl),
            "tls" | "starttls" => Ok(TransportMode::Tls),
            other => Err(Error::Configuration(format!(
                "{} is not one of the available connect methods: [plain, ssl, tls]",
                other
            ))),
        }
    }
}

/// How the session authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    #[default]
    Anonymous,
    Simple,
    Sasl,
}

impl FromStr for BindMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymous" => Ok(BindMode::Anonymous),
            "simple" => Ok(BindMode::Simple),
            "sasl" => Ok(BindMode::Sasl),
            other => Err(Error::Configuration(format!(
                "{} is not one of the available bind modes: [anonymous, simple, sasl]",
                other
            ))),
        }
    }
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindMode::Anonymous => "anonymous",
            BindMode::Simple => "simple",
            BindMode::Sasl => "sasl",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Directory connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port; defaults to 389, or 636 for `ssl`
    #[serde(default)]
    pub port: Option<u16>,

    /// Connect method: plain, ssl or tls
    #[serde(default = "default_method")]
    pub method: String,

    /// LDAP URL (`ldap://` or `ldaps://`); overrides host, port and method
    #[serde(default)]
    pub url: Option<String>,

    /// Base DN that mapping prefixes are relative to
    #[serde(default)]
    pub base: String,

    /// Bind mode: anonymous, simple or sasl
    #[serde(default = "default_bind_mode")]
    pub bind_mode: String,

    #[serde(default)]
    pub bind_dn: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// SASL mechanisms, tried in order
    #[serde(default = "default_sasl_mechanisms")]
    pub sasl_mechanisms: Vec<String>,

    /// Credential for mechanisms that take one
    #[serde(default)]
    pub sasl_credential: Option<String>,

    /// Fall back to an anonymous bind when the configured bind fails
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub skip_tls_verify: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_method() -> String {
    "plain".to_string()
}

fn default_bind_mode() -> String {
    "anonymous".to_string()
}

fn default_sasl_mechanisms() -> Vec<String> {
    vec!["EXTERNAL".to_string()]
}

fn default_timeout() -> u64 {
    10
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            method: default_method(),
            url: None,
            base: String::new(),
            bind_mode: default_bind_mode(),
            bind_dn: None,
            password: None,
            sasl_mechanisms: default_sasl_mechanisms(),
            sasl_credential: None,
            allow_anonymous: false,
            timeout_seconds: default_timeout(),
            skip_tls_verify: false,
        }
    }
}

/// Host, port and transport after applying `url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub mode: TransportMode,
    pub host: String,
    pub port: u16,
}

impl ConnectionConfig {
    pub fn transport_mode(&self) -> Result<TransportMode> {
        self.method.parse()
    }

    pub fn bind_mode(&self) -> Result<BindMode> {
        self.bind_mode.parse()
    }

    /// Resolve the endpoint. An `ldaps://` URL forces `ssl`; an `ldap://` URL
    /// keeps the configured method (plain or tls).
    pub fn endpoint(&self) -> Result<Endpoint> {
        let mut mode = self.transport_mode()?;
        let mut host = self.host.clone();
        let mut port = self.port;

        if let Some(raw) = &self.url {
            let url = Url::parse(raw)
                .map_err(|e| Error::Configuration(format!("Invalid LDAP URL {}: {}", raw, e)))?;
            match url.scheme() {
                "ldaps" => mode = TransportMode::Ssl,
                "ldap" => {
                    if mode == TransportMode::Ssl {
                        mode = TransportMode::Plain;
                    }
                }
                other => {
                    return Err(Error::Configuration(format!(
                        "Unsupported URL scheme: {}",
                        other
                    )))
                }
            }
            if let Some(h) = url.host_str() {
                host = h.to_string();
            }
            if url.port().is_some() {
                port = url.port();
            }
        }

        Ok(Endpoint {
            port: port.unwrap_or_else(|| mode.default_port()),
            mode,
            host,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint()?;
        if endpoint.host.trim().is_empty() {
            return Err(Error::Configuration("host must not be empty".into()));
        }
        match self.bind_mode()? {
            BindMode::Simple => {
                if self.bind_dn.as_deref().map(str::is_empty).unwrap_or(true) {
                    return Err(Error::Configuration(
                        "simple bind requires bind_dn".into(),
                    ));
                }
            }
            BindMode::Sasl => {
                if self.sasl_mechanisms.is_empty() {
                    return Err(Error::Configuration(
                        "sasl bind requires at least one mechanism".into(),
                    ));
                }
            }
            BindMode::Anonymous => {}
        }
        if self.timeout_seconds == 0 {
            return Err(Error::Configuration("timeout_seconds must be positive".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        match self.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(Error::Configuration(format!(
                "Unknown log format: {} (expected pretty or json)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArborConfig::default();
        assert_eq!(config.connection.transport_mode().unwrap(), TransportMode::Plain);
        assert_eq!(config.connection.bind_mode().unwrap(), BindMode::Anonymous);
        assert_eq!(config.connection.endpoint().unwrap().port, 389);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = ArborConfig::from_toml(
            r#"
            [connection]
            host = "ldap.example.com"
            method = "ssl"
            base = "dc=example,dc=com"
            bind_mode = "simple"
            bind_dn = "cn=admin,dc=example,dc=com"
            password = "secret"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        let endpoint = config.connection.endpoint().unwrap();
        assert_eq!(endpoint.mode, TransportMode::Ssl);
        assert_eq!(endpoint.port, 636);
        assert_eq!(config.connection.base, "dc=example,dc=com");
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_overrides_host_and_method() {
        let config = ConnectionConfig {
            url: Some("ldaps://directory.example.org:1636".into()),
            ..Default::default()
        };
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.mode, TransportMode::Ssl);
        assert_eq!(endpoint.host, "directory.example.org");
        assert_eq!(endpoint.port, 1636);

        let config = ConnectionConfig {
            url: Some("ldap://directory.example.org".into()),
            method: "tls".into(),
            ..Default::default()
        };
        let endpoint = config.endpoint().unwrap();
        assert_eq!(endpoint.mode, TransportMode::Tls);
        assert_eq!(endpoint.port, 389);
    }

    #[test]
    fn test_invalid_method_is_configuration_error() {
        let config = ConnectionConfig {
            method: "carrier-pigeon".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "ConfigurationError");
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_simple_bind_requires_dn() {
        let config = ConnectionConfig {
            bind_mode: "simple".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }
}
