//! Error types for Arbor

use thiserror::Error;

use crate::types::ValidationErrors;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Connection Errors
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Strong authentication required: {0}")]
    StrongAuthenticationRequired(String),

    // Filter Errors
    #[error("invalid logical operator: {0}: available operators: [and, &, or, |]")]
    InvalidFilterOperator(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    // Schema Errors
    #[error("unknown objectClass in LDAP server: {0}")]
    ObjectClass(String),

    #[error("Can't remove required objectClass: {0}")]
    RequiredObjectClassMissed(String),

    #[error("Value in objectClass array is not a String: {0}")]
    ObjectClassType(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Schema error: {0}")]
    Schema(String),

    // Entry Errors
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Entry already exists: {0}")]
    EntryAlreadyExists(String),

    #[error("Entry is invalid: {0}")]
    EntryInvalid(ValidationErrors),

    #[error("Invalid DN: {0}")]
    InvalidDn(String),

    // Operation Errors
    #[error("{operation} failed: {message} (result code {code}: {name})", name = code_label(.code))]
    Operation {
        operation: String,
        code: u32,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Stable name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "ConfigurationError",
            Error::Connection(_) => "ConnectionError",
            Error::AuthenticationFailed(_) => "AuthenticationError",
            Error::StrongAuthenticationRequired(_) => "StrongAuthenticationRequired",
            Error::InvalidFilterOperator(_) => "InvalidFilterOperator",
            Error::InvalidFilter(_) => "InvalidFilter",
            Error::ObjectClass(_) => "ObjectClassError",
            Error::RequiredObjectClassMissed(_) => "RequiredObjectClassMissed",
            Error::ObjectClassType(_) => "TypeError",
            Error::UnknownAttribute(_) => "UnknownAttribute",
            Error::Schema(_) => "SchemaError",
            Error::EntryNotFound(_) => "EntryNotFound",
            Error::EntryAlreadyExists(_) => "EntryAlreadyExist",
            Error::EntryInvalid(_) => "EntryInvalid",
            Error::InvalidDn(_) => "DistinguishedNameInvalid",
            Error::Operation { .. } => "OperationError",
            Error::Transport(_) => "TransportError",
            Error::Io(_) => "IoError",
            Error::Other(_) => "Error",
        }
    }

    /// Whether the error comes from the session itself rather than the request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::AuthenticationFailed(_)
                | Error::StrongAuthenticationRequired(_)
        )
    }

    /// Map a failed LDAP result code to the matching error kind.
    pub fn from_result_code(operation: &str, code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            32 => Error::EntryNotFound(message),
            68 => Error::EntryAlreadyExists(message),
            49 => Error::AuthenticationFailed(message),
            8 | 13 => Error::StrongAuthenticationRequired(message),
            52 => Error::Connection(message),
            _ => Error::Operation {
                operation: operation.to_string(),
                code,
                message,
            },
        }
    }
}

fn code_label(code: &u32) -> &'static str {
    result_code_name(*code)
}

/// Symbolic name of an LDAP result code (RFC 4511, appendix A).
pub fn result_code_name(code: u32) -> &'static str {
    match code {
        0 => "success",
        1 => "operationsError",
        2 => "protocolError",
        3 => "timeLimitExceeded",
        4 => "sizeLimitExceeded",
        5 => "compareFalse",
        6 => "compareTrue",
        7 => "authMethodNotSupported",
        8 => "strongerAuthRequired",
        10 => "referral",
        11 => "adminLimitExceeded",
        12 => "unavailableCriticalExtension",
        13 => "confidentialityRequired",
        14 => "saslBindInProgress",
        16 => "noSuchAttribute",
        17 => "undefinedAttributeType",
        18 => "inappropriateMatching",
        19 => "constraintViolation",
        20 => "attributeOrValueExists",
        21 => "invalidAttributeSyntax",
        32 => "noSuchObject",
        33 => "aliasProblem",
        34 => "invalidDNSyntax",
        36 => "aliasDereferencingProblem",
        48 => "inappropriateAuthentication",
        49 => "invalidCredentials",
        50 => "insufficientAccessRights",
        51 => "busy",
        52 => "unavailable",
        53 => "unwillingToPerform",
        54 => "loopDetect",
        64 => "namingViolation",
        65 => "objectClassViolation",
        66 => "notAllowedOnNonLeaf",
        67 => "notAllowedOnRDN",
        68 => "entryAlreadyExists",
        69 => "objectClassModsProhibited",
        71 => "affectsMultipleDSAs",
        80 => "other",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_mapping() {
        assert!(matches!(
            Error::from_result_code("delete", 32, "no such object"),
            Error::EntryNotFound(_)
        ));
        assert!(matches!(
            Error::from_result_code("add", 68, "exists"),
            Error::EntryAlreadyExists(_)
        ));
        assert!(matches!(
            Error::from_result_code("bind", 49, "bad password"),
            Error::AuthenticationFailed(_)
        ));

        let err = Error::from_result_code("modify", 65, "objectClass violation");
        assert_eq!(err.code(), "OperationError");
        let msg = err.to_string();
        assert!(msg.contains("modify failed"));
        assert!(msg.contains("objectClassViolation"));
        assert!(msg.contains("objectClass violation"));
    }

    #[test]
    fn test_error_categories() {
        assert!(Error::Connection("reset".into()).is_connection_error());
        assert!(Error::AuthenticationFailed("nope".into()).is_connection_error());
        assert!(!Error::EntryNotFound("uid=x".into()).is_connection_error());
    }

    #[test]
    fn test_invalid_operator_message_names_token() {
        let err = Error::InvalidFilterOperator("xxx".into());
        assert!(err.to_string().contains("xxx"));
        assert_eq!(err.code(), "InvalidFilterOperator");
    }
}
