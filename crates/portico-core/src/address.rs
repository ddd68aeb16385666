//! Opaque, scheme-prefixed function addresses.
//!
//! An address is structured text: `{scheme}://{transport routing info}`.
//! Only the issuing transport interprets the part after the scheme.
//! Network addresses are self-describing; `local://` and `script://`
//! addresses resolve only within the issuing portal's live registry.

use crate::error::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse an address, requiring a non-empty `scheme://rest` shape.
    pub fn parse(raw: impl Into<String>) -> PortalResult<Self> {
        let raw = raw.into();
        let Some((scheme, rest)) = raw.split_once("://") else {
            return Err(PortalError::address(&raw, "missing `scheme://` prefix"));
        };
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(PortalError::address(&raw, "invalid scheme"));
        }
        if rest.is_empty() {
            return Err(PortalError::address(&raw, "empty routing part"));
        }
        Ok(Self(raw))
    }

    pub fn scheme(&self) -> &str {
        // parse() guaranteed the separator exists
        self.0.split_once("://").map(|(scheme, _)| scheme).unwrap_or("")
    }

    /// Everything after `scheme://`.
    pub fn routing(&self) -> &str {
        self.0.split_once("://").map(|(_, rest)| rest).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = PortalError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_and_routing() {
        let address = Address::parse("http://localhost:8080/api/add/abc").unwrap();
        assert_eq!(address.scheme(), "http");
        assert_eq!(address.routing(), "localhost:8080/api/add/abc");
    }

    #[test]
    fn rejects_missing_separator() {
        let error = Address::parse("localadd-123").unwrap_err();
        assert!(matches!(error, PortalError::Address { .. }));
    }

    #[test]
    fn rejects_empty_scheme_and_routing() {
        assert!(Address::parse("://thing").is_err());
        assert!(Address::parse("local://").is_err());
        assert!(Address::parse("lo cal://x").is_err());
    }

    #[test]
    fn serde_rejects_malformed_input() {
        let ok: Address = serde_json::from_str("\"local://add-1\"").unwrap();
        assert_eq!(ok.scheme(), "local");
        assert!(serde_json::from_str::<Address>("\"nonsense\"").is_err());
    }
}
