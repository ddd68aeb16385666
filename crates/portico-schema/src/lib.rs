//! # portico-schema: value and function schema contract
//!
//! The portal system consumes schemas only through this crate's public
//! surface: a schema validates a value and reports per-field issues, and a
//! function schema additionally exposes its ordered inputs, required
//! names, and optional output shape.
//!
//! Intentionally dependency-light (no runtime deps like tokio or axum) so
//! transports and contract crates can depend on it freely.

pub mod function;
pub mod value;

pub use function::{FunctionSchema, FunctionSchemaBuilder, SchemaMetadata};
pub use value::{IssueCode, ValidationIssue, ValidationOutcome, ValueSchema};
