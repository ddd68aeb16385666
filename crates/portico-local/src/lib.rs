//! # portico-local: in-process transport
//!
//! No network, no serialization: the payload is a plain closure invoked
//! synchronously on the caller's own task after parameter validation. No
//! implicit concurrency is introduced.
//!
//! Addresses look like `local://{name}-{id}` and resolve only within the
//! issuing portal's live registry (a documented limitation, not a defect).

use async_trait::async_trait;
use parking_lot::RwLock;
use portico_core::{Address, CallContext, Function, Portal, PortalError, PortalResult, address_id};
use portico_schema::FunctionSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Implementation payload for the in-process transport.
pub type LocalHandler = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Wrap a closure as a [`LocalHandler`].
pub fn local_handler<F>(f: F) -> LocalHandler
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Portal whose functions run in the registering process.
#[derive(Default)]
pub struct LocalPortal {
    registry: RwLock<HashMap<String, Arc<LocalFunction>>>,
}

impl LocalPortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every registration. Outstanding `Function` handles stay
    /// callable; only resolution through this portal forgets them.
    pub fn clear(&self) {
        self.registry.write().clear();
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }
}

#[async_trait]
impl Portal for LocalPortal {
    type Payload = LocalHandler;

    fn scheme(&self) -> &'static str {
        "local"
    }

    fn generate_address(&self, name: &str, _payload: &LocalHandler) -> PortalResult<Address> {
        if name.is_empty() {
            return Err(PortalError::address("local://", "empty function name"));
        }
        Address::parse(format!("local://{name}-{}", address_id()))
    }

    async fn apply(
        &self,
        address: &Address,
        schema: FunctionSchema,
        payload: LocalHandler,
    ) -> PortalResult<Arc<dyn Function>> {
        if address.scheme() != self.scheme() {
            return Err(PortalError::address(
                address.as_str(),
                "not a local:// address",
            ));
        }
        let function = Arc::new(LocalFunction {
            address: address.clone(),
            schema,
            handler: payload,
        });
        self.registry
            .write()
            .insert(address.as_str().to_owned(), function.clone());
        Ok(function)
    }

    async fn resolve_function(&self, address: &Address) -> PortalResult<Arc<dyn Function>> {
        if address.scheme() != self.scheme() {
            return Err(PortalError::address(
                address.as_str(),
                "not a local:// address",
            ));
        }
        self.registry
            .read()
            .get(address.as_str())
            .cloned()
            .map(|f| f as Arc<dyn Function>)
            .ok_or_else(|| {
                PortalError::address(address.as_str(), "not registered in this portal")
            })
    }
}

struct LocalFunction {
    address: Address,
    schema: FunctionSchema,
    handler: LocalHandler,
}

#[async_trait]
impl Function for LocalFunction {
    #[instrument(skip(self, _ctx, params), fields(address = %self.address))]
    async fn call(&self, _ctx: &CallContext, params: Value) -> PortalResult<Value> {
        let outcome = self.schema.validate_params(&params);
        if !outcome.is_valid() {
            return Err(PortalError::invalid_params(outcome.issues));
        }

        let result = (self.handler)(params).map_err(PortalError::execution)?;

        let check = self.schema.validate_result(&result);
        if !check.is_valid() {
            warn!(
                address = %self.address,
                issues = check.issues.len(),
                "result does not match declared output schema"
            );
        }
        Ok(result)
    }

    fn schema(&self) -> &FunctionSchema {
        &self.schema
    }

    fn address(&self) -> &Address {
        &self.address
    }
}
