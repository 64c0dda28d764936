//! Content type definitions and the registry that serves them.
//!
//! # Philosophy: the schema is data
//!
//! Content types in Folio are authored at runtime, not compiled in. A
//! definition is a plain value: `{slug, kind, cardinality, fields}` where
//! every field carries a closed type tag (`string`, `file`, `array`,
//! `relation`, ...). The resolution engine reads these values fresh on every
//! request and derives all storage locations from them by naming convention.
//!
//! Two consequences shape this crate:
//!
//! - The field union is **closed**. A tag the engine doesn't know is a
//!   deserialization error at the registry boundary, never a
//!   half-understood field that leaks into resolution.
//! - The registry is a **trait** ([`TypeRegistry`]). The engine takes it as
//!   an injected dependency; storage-backed and in-memory implementations
//!   ship here, and callers can bring their own.
//!
//! # Modules
//!
//! - [`types`]: definitions (ContentTypeDefinition, FieldDefinition, ...)
//! - [`registry`]: the TypeRegistry trait and its implementations

pub mod registry;
pub mod types;

mod error;

pub use error::{Result, SchemaError};
pub use registry::{DbTypeRegistry, MemoryTypeRegistry, TypeRegistry};
pub use types::{
    validate_slug, Cardinality, ContentKind, ContentTypeDefinition, FieldDefinition, FieldMap,
    RelationKind,
};
