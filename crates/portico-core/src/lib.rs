//! # portico-core: transport-agnostic function-portal contracts
//!
//! A caller invokes a *named operation* without knowing whether the
//! implementation runs in-process, behind a network endpoint, or inside a
//! sandboxed script interpreter. This crate defines the pieces every
//! transport shares:
//!
//! - [`address`]: scheme-prefixed opaque addresses
//! - [`context`]: per-call deadlines
//! - [`error`]: the shared error taxonomy transports translate into
//! - [`portal`]: the `Portal` / `Function` contracts
//! - [`registry`]: name-indexed convenience layer over one portal
//! - [`consumer`]: scheme-keyed portal directory erasing transport differences
//!
//! Control flow: caller → [`Consumer::call_at`] → parse scheme → matching
//! portal's `resolve_function` → `Function::call` → transport-specific
//! execution with schema validation → uniform result/error back.
//!
//! There are no process-wide singletons: callers construct portals,
//! registries, and consumers explicitly and pass them where needed.

pub mod address;
pub mod consumer;
pub mod context;
pub mod error;
pub mod portal;
pub mod registry;

pub use address::Address;
pub use consumer::{Consumer, ErasedPortal};
pub use context::CallContext;
pub use error::{BoxError, ExecutionStage, PortalError, PortalResult, ValidationStage};
pub use portal::{Function, Portal, address_id};
pub use registry::Registry;
