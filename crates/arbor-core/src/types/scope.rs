//! Search scope

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Search breadth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The base entry only
    Base,
    /// Immediate children of the base entry
    One,
    /// The base entry and its whole subtree
    #[default]
    Sub,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Base, Scope::One, Scope::Sub];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Base => "base",
            Scope::One => "one",
            Scope::Sub => "sub",
        }
    }

    /// Protocol scope code (RFC 4511 SearchRequest.scope)
    pub fn code(&self) -> u8 {
        match self {
            Scope::Base => 0,
            Scope::One => 1,
            Scope::Sub => 2,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Scope::Base),
            "one" | "onelevel" | "one_level" => Ok(Scope::One),
            "sub" | "subtree" => Ok(Scope::Sub),
            other => Err(crate::Error::Configuration(format!(
                "{:?} is not one of the available LDAP scope: [base, one, sub]",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!("base".parse::<Scope>().unwrap(), Scope::Base);
        assert_eq!("ONE".parse::<Scope>().unwrap(), Scope::One);
        assert_eq!("subtree".parse::<Scope>().unwrap(), Scope::Sub);

        let err = "deep".parse::<Scope>().unwrap_err();
        assert_eq!(err.code(), "ConfigurationError");
    }

    #[test]
    fn test_scope_codes() {
        let codes: Vec<u8> = Scope::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![0, 1, 2]);
    }
}
