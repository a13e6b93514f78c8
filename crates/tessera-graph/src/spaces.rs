//! Semantic spaces enclosing a node.
//!
//! A semantic-space node (a negation, a hypothetical, ...) frames the
//! statements in its `contents`. Every node and primary edge written
//! beneath it carries the names of the enclosing space types, outermost
//! first, in a `semantic_spaces` property. Outside any space the list is
//! empty.

use serde_json::{Map, Value};
use tessera_core::TypeDescriptor;

pub const SEMANTIC_SPACES: &str = "semantic_spaces";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemanticSpaces(Vec<String>);

impl SemanticSpaces {
    /// No enclosing space: the scope of a head.
    pub fn root() -> Self {
        Self::default()
    }

    /// The scope for the children of a node of type `descriptor`.
    pub fn enter(&self, descriptor: &TypeDescriptor) -> Self {
        let mut names = self.0.clone();
        if descriptor.semantic_space {
            names.push(descriptor.name.clone());
        }
        Self(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn insert_into(&self, props: &mut Map<String, Value>) {
        props.insert(
            SEMANTIC_SPACES.to_string(),
            Value::Array(self.0.iter().cloned().map(Value::String).collect()),
        );
    }
}
