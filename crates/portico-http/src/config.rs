//! Network portal configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behavior of one [`crate::HttpPortal`] instance. Supplied once at
/// construction and immutable afterwards; reconfiguration means
/// constructing a new portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpPortalConfig {
    /// Host embedded in generated addresses and bound by the provider.
    pub host: String,
    /// Port to bind; `0` asks the OS for an ephemeral port, reflected in
    /// addresses generated after `start_server`.
    pub port: u16,
    /// Selects the `https` scheme for generated addresses and outbound
    /// calls. TLS termination itself is expected at a fronting proxy; the
    /// provider listener stays plain.
    pub tls: bool,
    /// Deadline for one attempt when the caller supplies none.
    pub default_timeout: Duration,
    /// Retries after the first attempt, for retryable failures only.
    pub max_retries: u32,
    /// Fixed pause between attempts. Deliberately not exponential and not
    /// jittered; correlated failures can produce synchronized retry storms.
    pub retry_delay: Duration,
    /// Routing prefix for every registered function, e.g. `/portal`.
    pub base_path: String,
}

impl Default for HttpPortalConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 0,
            tls: false,
            default_timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_delay: Duration::from_millis(250),
            base_path: "/portal".to_owned(),
        }
    }
}

impl HttpPortalConfig {
    /// Base path with a leading slash and no trailing slash.
    pub(crate) fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    pub(crate) fn url_scheme(&self) -> &'static str {
        if self.tls { "https" } else { "http" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_is_normalized() {
        let mut config = HttpPortalConfig::default();
        assert_eq!(config.normalized_base_path(), "/portal");

        config.base_path = "api/".to_owned();
        assert_eq!(config.normalized_base_path(), "/api");

        config.base_path = "/".to_owned();
        assert_eq!(config.normalized_base_path(), "");
    }

    #[test]
    fn tls_selects_https() {
        let mut config = HttpPortalConfig::default();
        assert_eq!(config.url_scheme(), "http");
        config.tls = true;
        assert_eq!(config.url_scheme(), "https");
    }
}
