//! # portico-http: network transport
//!
//! One portal type with two roles. The provider binds an axum listener and
//! serves every registered function at `POST {base}/{name}/{id}`; the
//! consumer reaches any such address with a reqwest client, a fixed-delay
//! retry policy, and client-side parameter validation.
//!
//! Addresses are self-describing (`http://host:port/base/name/id`): any
//! process with network access can resolve them, fetching the schema from
//! the provider's `/schema` sub-path when the registration is not local.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use portico_core::{Address, Function, Portal, PortalError, PortalResult, address_id};
use portico_schema::FunctionSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

pub mod config;
pub mod middleware;
pub mod wire;

mod client;
mod server;

pub use config::HttpPortalConfig;
pub use middleware::{HeaderMiddleware, Middleware, MiddlewareChain, RequireAuthMiddleware};
pub use wire::{RequestParts, ResponseParts, WireError};

/// Failure signaled by a registered handler. An explicit status is
/// reflected in the provider's response; without one the provider answers
/// with a generic server error.
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub status: Option<u16>,
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Implementation payload for the network transport: an async handler from
/// a JSON parameter object to a JSON result.
pub type HttpHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Wrap an async closure as an [`HttpHandler`].
pub fn http_handler<F, Fut>(f: F) -> HttpHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

pub(crate) struct HttpRegistration {
    pub(crate) name: String,
    pub(crate) schema: FunctionSchema,
    pub(crate) handler: HttpHandler,
}

pub(crate) type RegistrationMap = Arc<RwLock<HashMap<String, Arc<HttpRegistration>>>>;

/// Network portal: provider and consumer roles over one configuration.
pub struct HttpPortal {
    config: HttpPortalConfig,
    middleware: MiddlewareChain,
    registrations: RegistrationMap,
    client: reqwest::Client,
    server: tokio::sync::Mutex<Option<server::ServerHandle>>,
    bound: RwLock<Option<SocketAddr>>,
}

impl HttpPortal {
    pub fn new(config: HttpPortalConfig) -> PortalResult<Self> {
        Self::with_middleware(config, Vec::new())
    }

    pub fn with_middleware(
        config: HttpPortalConfig,
        layers: Vec<Arc<dyn Middleware>>,
    ) -> PortalResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PortalError::Transport {
                address: String::new(),
                status: None,
                message: "failed building HTTP client".to_owned(),
                body: None,
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            config,
            middleware: MiddlewareChain::new(layers),
            registrations: Arc::new(RwLock::new(HashMap::new())),
            client,
            server: tokio::sync::Mutex::new(None),
            bound: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &HttpPortalConfig {
        &self.config
    }

    /// The socket the provider is listening on, once started.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        *self.bound.read()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.registrations.write().clear();
    }

    /// Port embedded in generated addresses: the bound port once the
    /// server is up, else the configured one.
    fn effective_port(&self) -> u16 {
        self.bound.read().map(|a| a.port()).unwrap_or(self.config.port)
    }

    /// Split an address issued under this scheme into URL, name, and id.
    fn parse_function_address(
        &self,
        address: &Address,
    ) -> PortalResult<(url::Url, String, String)> {
        if address.scheme() != self.config.url_scheme() {
            return Err(PortalError::address(
                address.as_str(),
                format!("expected scheme `{}`", self.config.url_scheme()),
            ));
        }
        let url = url::Url::parse(address.as_str())
            .map_err(|e| PortalError::address(address.as_str(), e.to_string()))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() < 2 {
            return Err(PortalError::address(
                address.as_str(),
                "path must end with /{name}/{id}",
            ));
        }
        let id = segments[segments.len() - 1].to_owned();
        let name = segments[segments.len() - 2].to_owned();
        Ok((url, name, id))
    }

    pub(crate) fn registration_key(name: &str, id: &str) -> String {
        format!("{name}/{id}")
    }

    fn make_function(
        &self,
        address: &Address,
        url: url::Url,
        schema: FunctionSchema,
    ) -> Arc<dyn Function> {
        Arc::new(client::HttpFunction::new(
            address.clone(),
            url,
            schema,
            self.client.clone(),
            self.config.clone(),
            self.middleware.clone(),
        ))
    }
}

#[async_trait]
impl Portal for HttpPortal {
    type Payload = HttpHandler;

    fn scheme(&self) -> &'static str {
        self.config.url_scheme()
    }

    fn generate_address(&self, name: &str, _payload: &HttpHandler) -> PortalResult<Address> {
        if name.is_empty() || name.contains('/') {
            return Err(PortalError::address(name, "invalid function name"));
        }
        Address::parse(format!(
            "{}://{}:{}{}/{}/{}",
            self.config.url_scheme(),
            self.config.host,
            self.effective_port(),
            self.config.normalized_base_path(),
            name,
            address_id()
        ))
    }

    async fn apply(
        &self,
        address: &Address,
        schema: FunctionSchema,
        payload: HttpHandler,
    ) -> PortalResult<Arc<dyn Function>> {
        let (url, name, id) = self.parse_function_address(address)?;
        let registration = Arc::new(HttpRegistration {
            name: name.clone(),
            schema: schema.clone(),
            handler: payload,
        });
        self.registrations
            .write()
            .insert(Self::registration_key(&name, &id), registration);
        Ok(self.make_function(address, url, schema))
    }

    async fn resolve_function(&self, address: &Address) -> PortalResult<Arc<dyn Function>> {
        let (url, name, id) = self.parse_function_address(address)?;

        // A registration issued by this portal carries its schema locally;
        // anything else is remote and self-describing via /schema.
        let local_schema = self
            .registrations
            .read()
            .get(&Self::registration_key(&name, &id))
            .map(|r| r.schema.clone());

        let schema = match local_schema {
            Some(schema) => schema,
            None => client::fetch_schema(&self.client, address, &self.config).await?,
        };

        Ok(self.make_function(address, url, schema))
    }
}
