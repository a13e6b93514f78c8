//! tessera-core: Entity model, schema registry, configuration, and errors.
//!
//! This crate provides the foundational types shared by every Tessera component:
//! - Entity trees (heads, inline children, references) as handed to the write engine
//! - Property values and their database-primitive coercions
//! - The schema registry of compiled type and field descriptors
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod schema;
pub mod types;

pub use config::{GraphConfig, TesseraConfig, WriteSettings};
pub use error::{SchemaError, TesseraError};
pub use schema::{
    EmbeddedDefinition, FieldDescriptor, FieldKind, PropertyDescriptor, PropertyKind,
    RelationDefinition, SchemaDocument, SchemaRegistry, TypeDefinition, TypeDescriptor,
};
pub use types::{Entity, EntityKind, ExternalId, ExternalRef, MultiKeyValue, PropertyValue};
