//! Entity trees handed to the write engine.
//!
//! An [`Entity`] is one node of an input tree: the head being created or
//! updated, an owned child (inline, embedded, reified relation), or a
//! reference to a node that already exists. Children hang off relation
//! fields by name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ──────────────────────────────────────────────────

/// Stable external identifier of a persisted node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ExternalId(pub Uuid);

impl ExternalId {
    /// Mint a fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ExternalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExternalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// How an entity names an existing (or to-be-merged) node.
///
/// Deserializes from a bare string: UUIDs become [`ExternalRef::Id`],
/// anything else is treated as a URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum ExternalRef {
    Id(ExternalId),
    Uri(String),
}

impl ExternalRef {
    pub fn as_id(&self) -> Option<ExternalId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Uri(_) => None,
        }
    }
}

impl From<ExternalId> for ExternalRef {
    fn from(id: ExternalId) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Uri(uri) => write!(f, "{uri}"),
        }
    }
}

// ── Property Values ──────────────────────────────────────────────

/// A value assigned to a declared property.
///
/// Documents deserialize into the JSON-shaped variants (`Null`, `Bool`,
/// `Int`, `Float`, `String`, `List`, `MultiKey`). The typed variants are
/// built in code and coerced to database primitives on write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
    MultiKey(MultiKeyValue),
    Id(ExternalId),
    Uri(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// Unordered collection; written as a deduplicated, sorted list.
    Set(Vec<PropertyValue>),
    /// Fixed-arity collection; written as a list in order.
    Tuple(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// A primary value plus named qualifier parts, e.g. a date with a precision.
///
/// Stored flattened as `<field>____value` and `<field>____<part>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiKeyValue {
    pub value: Box<PropertyValue>,
    #[serde(flatten)]
    pub parts: BTreeMap<String, PropertyValue>,
}

impl MultiKeyValue {
    pub fn new(value: impl Into<PropertyValue>) -> Self {
        Self {
            value: Box::new(value.into()),
            parts: BTreeMap::new(),
        }
    }

    pub fn with_part(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.parts.insert(name.to_string(), value.into());
        self
    }
}

// ── Entities ─────────────────────────────────────────────────────

/// What the write engine should do with an entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A node that does not exist yet.
    New,
    /// A pointer to a node that must already exist.
    Reference,
    /// A pointer that creates the node if nothing with its id or URI exists.
    ReferenceCreate,
    /// An already-persisted node carrying edits.
    Existing,
}

/// One node of an input tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ExternalRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,

    /// Children by relation (or embedded) field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, Vec<Entity>>,

    /// Properties of the edge that attaches this entity to its parent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edge_properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    fn with_kind(kind: EntityKind, type_name: &str, id: Option<ExternalRef>) -> Self {
        Self {
            kind,
            type_name: type_name.to_string(),
            id,
            label: None,
            uris: Vec::new(),
            properties: BTreeMap::new(),
            relations: BTreeMap::new(),
            edge_properties: BTreeMap::new(),
        }
    }

    /// A node to be created; its id is minted on write.
    pub fn new(type_name: &str) -> Self {
        Self::with_kind(EntityKind::New, type_name, None)
    }

    pub fn reference(type_name: &str, id: impl Into<ExternalRef>) -> Self {
        Self::with_kind(EntityKind::Reference, type_name, Some(id.into()))
    }

    pub fn reference_create(type_name: &str, id: impl Into<ExternalRef>) -> Self {
        Self::with_kind(EntityKind::ReferenceCreate, type_name, Some(id.into()))
    }

    pub fn existing(type_name: &str, id: ExternalId) -> Self {
        Self::with_kind(EntityKind::Existing, type_name, Some(ExternalRef::Id(id)))
    }

    pub fn with_id(mut self, id: impl Into<ExternalRef>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uris.push(uri.to_string());
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Append a child to a relation field.
    pub fn with_child(mut self, field: &str, child: Entity) -> Self {
        self.relations
            .entry(field.to_string())
            .or_default()
            .push(child);
        self
    }

    /// Set a relation field to exactly these children (possibly none).
    pub fn with_relation(mut self, field: &str, children: Vec<Entity>) -> Self {
        self.relations.insert(field.to_string(), children);
        self
    }

    pub fn with_edge_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.edge_properties.insert(name.to_string(), value.into());
        self
    }

    /// The external id, when the entity carries one (not a URI).
    pub fn external_id(&self) -> Option<ExternalId> {
        self.id.as_ref().and_then(ExternalRef::as_id)
    }
}
