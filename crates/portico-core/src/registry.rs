//! Name-indexed convenience layer over one portal.

use crate::address::Address;
use crate::error::{PortalError, PortalResult};
use crate::portal::{Function, Portal};
use parking_lot::RwLock;
use portico_schema::FunctionSchema;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps human-readable names to addresses issued by exactly one portal.
///
/// Duplicate names are rejected loudly rather than silently overwritten.
pub struct Registry<P: Portal> {
    portal: Arc<P>,
    addresses: RwLock<HashMap<String, Address>>,
}

impl<P: Portal> Registry<P> {
    pub fn new(portal: Arc<P>) -> Self {
        Self {
            portal,
            addresses: RwLock::new(HashMap::new()),
        }
    }

    pub fn portal(&self) -> &Arc<P> {
        &self.portal
    }

    /// Generate an address for `name`, register the payload under it, and
    /// remember the mapping.
    pub async fn register(
        &self,
        name: &str,
        schema: FunctionSchema,
        payload: P::Payload,
    ) -> PortalResult<Address> {
        let address = self.portal.generate_address(name, &payload)?;

        // Reserve the name before touching the portal, so a lost race
        // never leaves an orphaned registration behind in the portal.
        {
            let mut guard = self.addresses.write();
            if guard.contains_key(name) {
                return Err(PortalError::DuplicateName { name: name.into() });
            }
            guard.insert(name.to_owned(), address.clone());
        }

        if let Err(error) = self.portal.apply(&address, schema, payload).await {
            self.addresses.write().remove(name);
            return Err(error);
        }
        debug!(name, address = %address, "function registered");
        Ok(address)
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.addresses.read().get(name).cloned()
    }

    /// Re-resolve `name` through the bound portal.
    pub async fn function(&self, name: &str) -> PortalResult<Arc<dyn Function>> {
        let address = self
            .address(name)
            .ok_or_else(|| PortalError::UnknownName { name: name.into() })?;
        self.portal.resolve_function(&address).await
    }

    pub fn names(&self) -> Vec<String> {
        self.addresses.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.addresses.write().clear();
    }
}
