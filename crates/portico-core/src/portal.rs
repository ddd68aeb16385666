//! The `Portal` / `Function` contracts every transport implements.

use crate::address::Address;
use crate::context::CallContext;
use crate::error::PortalResult;
use async_trait::async_trait;
use portico_schema::FunctionSchema;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// A callable handle to one registered function, bound to an address and a
/// schema.
///
/// Implementations must, in order: validate `params` against the schema's
/// inputs (failing fast without invoking the implementation), execute via
/// the transport, check the result against the schema's output
/// (non-fatal, logged only), and translate transport failures into
/// [`crate::PortalError`] while preserving the original cause.
#[async_trait]
pub trait Function: Send + Sync {
    async fn call(&self, ctx: &CallContext, params: Value) -> PortalResult<Value>;

    fn schema(&self) -> &FunctionSchema;

    fn address(&self) -> &Address;
}

/// A transport adapter: addressing, registration, and resolution for one
/// scheme.
///
/// `Payload` is the transport's implementation-carrier type (a closure for
/// the in-process transport, script source for the script transport, an
/// async handler for the network transport). Any address produced by
/// `generate_address` or accepted by `apply` must resolve through the same
/// portal's `resolve_function`.
#[async_trait]
pub trait Portal: Send + Sync {
    type Payload: Send + Sync + 'static;

    fn scheme(&self) -> &'static str;

    /// Produce a fresh, collision-free address for `name`. Implementations
    /// embed a random identifier suffix (uuid v4) so concurrent
    /// registrations of the same name never collide.
    fn generate_address(&self, name: &str, payload: &Self::Payload) -> PortalResult<Address>;

    /// Register `payload` under `address` and return the callable handle.
    async fn apply(
        &self,
        address: &Address,
        schema: FunctionSchema,
        payload: Self::Payload,
    ) -> PortalResult<Arc<dyn Function>>;

    /// Invert an address issued by this portal back into a callable handle.
    async fn resolve_function(&self, address: &Address) -> PortalResult<Arc<dyn Function>>;
}

/// Random identifier suffix for generated addresses (uuid v4, simple form).
pub fn address_id() -> String {
    Uuid::new_v4().simple().to_string()
}
