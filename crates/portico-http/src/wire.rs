//! Wire-level shapes shared by the provider and consumer roles.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Error body carried on non-success responses:
/// `{error, status, details?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub error: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl WireError {
    pub fn new(status: u16, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The request descriptor middleware sees and may rewrite.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: String,
    /// Origin part, `scheme://host:port`.
    pub base_url: String,
    /// Path below the origin, `/{base}/{name}/{id}`.
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    /// Bearer token, sent as `Authorization: Bearer …` when present.
    pub auth: Option<String>,
    /// JSON object of named parameters.
    pub body: Value,
}

impl RequestParts {
    pub fn post(base_url: impl Into<String>, path: impl Into<String>, body: Value) -> Self {
        Self {
            method: "POST".to_owned(),
            base_url: base_url.into(),
            path: path.into(),
            headers: HashMap::new(),
            query: Vec::new(),
            auth: None,
            body,
        }
    }
}

/// The response descriptor middleware sees and may rewrite.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_error_omits_empty_details() {
        let plain = serde_json::to_string(&WireError::new(503, "unavailable")).unwrap();
        assert!(!plain.contains("details"));

        let detailed = serde_json::to_string(
            &WireError::new(400, "bad params").with_details(json!([{"path": "b"}])),
        )
        .unwrap();
        assert!(detailed.contains("\"details\""));
    }
}
