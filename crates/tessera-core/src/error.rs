use thiserror::Error;

/// Top-level error type for Tessera.
#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Cannot coerce property '{property}': {reason}")]
    Coercion { property: String, reason: String },

    #[error("Invalid entity {type_name}: {reason}")]
    InvalidEntity { type_name: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TesseraError {
    pub fn invalid_entity(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntity {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn coercion(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Coercion {
            property: property.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while compiling or querying the schema registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema registry has not been initialized")]
    NotInitialized,

    #[error("type '{0}' is declared more than once")]
    DuplicateType(String),

    #[error("unknown type '{name}' referenced by {referenced_by}")]
    UnknownType { name: String, referenced_by: String },

    #[error("supertype cycle through '{0}'")]
    InheritanceCycle(String),

    #[error("'{0}' is not a valid graph identifier")]
    InvalidName(String),

    #[error("field '{field}' is declared more than once on type '{type_name}'")]
    DuplicateField { type_name: String, field: String },

    #[error("reified relation type '{0}' is missing its target definition")]
    MissingTarget(String),

    #[error("field '{field}' on '{type_name}' subclasses unknown relation '{parent}'")]
    UnknownSubclassedRelation {
        type_name: String,
        field: String,
        parent: String,
    },

    #[error("relation '{field}' on '{type_name}' has no target types")]
    EmptyTargets { type_name: String, field: String },

    #[error("semantic space '{type_name}' is invalid: {reason}")]
    InvalidSemanticSpace { type_name: String, reason: String },
}
