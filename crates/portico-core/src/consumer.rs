//! Scheme-keyed portal directory, the one place transport differences are
//! erased.

use crate::address::Address;
use crate::context::CallContext;
use crate::error::{PortalError, PortalResult};
use crate::portal::{Function, Portal};
use async_trait::async_trait;
use parking_lot::RwLock;
use portico_schema::FunctionSchema;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Object-safe view of a portal with the payload type erased.
///
/// The blanket adapter below is the single sanctioned dynamic-typing point
/// in the system: a payload of the wrong type fails with
/// [`PortalError::PayloadType`]. That is a programmer error, surfaced
/// clearly, never coerced.
#[async_trait]
pub trait ErasedPortal: Send + Sync {
    fn scheme(&self) -> &'static str;

    async fn resolve_function(&self, address: &Address) -> PortalResult<Arc<dyn Function>>;

    fn generate_address_erased(
        &self,
        name: &str,
        payload: &(dyn Any + Send + Sync),
    ) -> PortalResult<Address>;

    async fn apply_erased(
        &self,
        address: &Address,
        schema: FunctionSchema,
        payload: Box<dyn Any + Send + Sync>,
    ) -> PortalResult<Arc<dyn Function>>;
}

struct PortalAdapter<P: Portal> {
    inner: Arc<P>,
}

impl<P: Portal> PortalAdapter<P> {
    fn payload_mismatch(&self) -> PortalError {
        PortalError::PayloadType {
            scheme: self.inner.scheme().to_owned(),
            expected: std::any::type_name::<P::Payload>(),
        }
    }
}

#[async_trait]
impl<P: Portal + 'static> ErasedPortal for PortalAdapter<P> {
    fn scheme(&self) -> &'static str {
        self.inner.scheme()
    }

    async fn resolve_function(&self, address: &Address) -> PortalResult<Arc<dyn Function>> {
        self.inner.resolve_function(address).await
    }

    fn generate_address_erased(
        &self,
        name: &str,
        payload: &(dyn Any + Send + Sync),
    ) -> PortalResult<Address> {
        let payload = payload
            .downcast_ref::<P::Payload>()
            .ok_or_else(|| self.payload_mismatch())?;
        self.inner.generate_address(name, payload)
    }

    async fn apply_erased(
        &self,
        address: &Address,
        schema: FunctionSchema,
        payload: Box<dyn Any + Send + Sync>,
    ) -> PortalResult<Arc<dyn Function>> {
        let payload = payload
            .downcast::<P::Payload>()
            .map_err(|_| self.payload_mismatch())?;
        self.inner.apply(address, schema, *payload).await
    }
}

/// Dispatches any address to the portal mounted for its scheme.
#[derive(Default)]
pub struct Consumer {
    portals: RwLock<HashMap<String, Arc<dyn ErasedPortal>>>,
}

impl Consumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a portal under its scheme. A second portal for the same
    /// scheme is rejected.
    pub fn mount<P: Portal + 'static>(&self, portal: Arc<P>) -> PortalResult<()> {
        let scheme = portal.scheme();
        let mut guard = self.portals.write();
        if guard.contains_key(scheme) {
            return Err(PortalError::DuplicateScheme {
                scheme: scheme.into(),
            });
        }
        guard.insert(scheme.to_owned(), Arc::new(PortalAdapter { inner: portal }));
        Ok(())
    }

    pub fn schemes(&self) -> Vec<String> {
        self.portals.read().keys().cloned().collect()
    }

    fn portal_for(&self, address: &Address) -> PortalResult<Arc<dyn ErasedPortal>> {
        let scheme = address.scheme();
        self.portals
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| PortalError::UnknownScheme {
                scheme: scheme.into(),
            })
    }

    /// Resolve an address through whichever portal owns its scheme.
    pub async fn resolve(&self, address: &Address) -> PortalResult<Arc<dyn Function>> {
        self.portal_for(address)?.resolve_function(address).await
    }

    /// The transparent call-site: parse scheme, dispatch, resolve, call.
    #[instrument(skip(self, ctx, params), fields(address = %address))]
    pub async fn call_at(
        &self,
        ctx: &CallContext,
        address: &Address,
        params: Value,
    ) -> PortalResult<Value> {
        let function = self.resolve(address).await?;
        function.call(ctx, params).await
    }

    /// Erased registration so one call-site can also provision. The payload
    /// must be the mounted portal's payload type.
    pub async fn apply_at(
        &self,
        address: &Address,
        schema: FunctionSchema,
        payload: Box<dyn Any + Send + Sync>,
    ) -> PortalResult<Arc<dyn Function>> {
        self.portal_for(address)?
            .apply_erased(address, schema, payload)
            .await
    }
}
