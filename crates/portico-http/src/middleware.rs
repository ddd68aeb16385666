//! Request/response interceptor chain.
//!
//! Request middleware runs in registration order before the handler;
//! response middleware runs in reverse order after it. The outermost
//! middleware sees the request first and the response last.

use crate::wire::{RequestParts, ResponseParts};
use portico_core::{PortalError, PortalResult};
use std::sync::Arc;

pub trait Middleware: Send + Sync {
    fn on_request(&self, _request: &mut RequestParts) -> PortalResult<()> {
        Ok(())
    }

    fn on_response(&self, _response: &mut ResponseParts) -> PortalResult<()> {
        Ok(())
    }
}

/// Ordered, shareable set of middleware. Handlers run concurrently, so
/// middleware carrying state must use atomics or its own locking.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            layers: Arc::new(layers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run request middleware in registration order; the first failure
    /// short-circuits.
    pub fn apply_request(&self, request: &mut RequestParts) -> PortalResult<()> {
        for layer in self.layers.iter() {
            layer.on_request(request)?;
        }
        Ok(())
    }

    /// Run response middleware in reverse registration order.
    pub fn apply_response(&self, response: &mut ResponseParts) -> PortalResult<()> {
        for layer in self.layers.iter().rev() {
            layer.on_response(response)?;
        }
        Ok(())
    }
}

/// Middleware that attaches a fixed header to every request.
pub struct HeaderMiddleware {
    name: String,
    value: String,
}

impl HeaderMiddleware {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Middleware for HeaderMiddleware {
    fn on_request(&self, request: &mut RequestParts) -> PortalResult<()> {
        request
            .headers
            .insert(self.name.clone(), self.value.clone());
        Ok(())
    }
}

/// Middleware that rejects requests missing a bearer token.
pub struct RequireAuthMiddleware;

impl Middleware for RequireAuthMiddleware {
    fn on_request(&self, request: &mut RequestParts) -> PortalResult<()> {
        let has_token = request.auth.is_some()
            || request
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("authorization"));
        if has_token {
            Ok(())
        } else {
            Err(PortalError::transport(
                format!("{}{}", request.base_url, request.path),
                "request rejected by middleware: missing authorization",
            ))
        }
    }
}
