//! Node labels and edge markers written by the engine.

use tessera_core::TypeDescriptor;

pub const HEAD_NODE: &str = "HeadNode";
pub const INDEXABLE: &str = "PGIndexableNode";
pub const EMBEDDED: &str = "Embedded";
pub const READ_INLINE: &str = "ReadInline";
pub const CREATE_INLINE: &str = "CreateInline";
pub const EDIT_INLINE: &str = "EditInline";
pub const DETACH_DELETE: &str = "DetachDelete";
pub const REIFIED_RELATION: &str = "ReifiedRelation";
pub const SEMANTIC_SPACE: &str = "SemanticSpace";

/// Labels of the node that links an entity to one of its URIs.
pub const URI_NODE: &str = "PGUri:PGCore:PGInternal";
pub const USER_NODE: &str = "PGUser:PGCore:PGInternal";
pub const CREATION_NODE: &str = "PGCreation:PGCore:PGInternal";
pub const MODIFICATION_NODE: &str = "PGModification:PGCore:PGInternal";

pub const URIS_REL: &str = "URIS";
pub const CREATED_IN_REL: &str = "PG_CREATED_IN";
pub const CREATED_BY_REL: &str = "PG_CREATED_BY";
pub const MODIFIED_IN_REL: &str = "PG_MODIFIED_IN";
pub const MODIFIED_BY_REL: &str = "PG_MODIFIED_BY";

// ── Edge markers ─────────────────────────────────────────────────

/// `true` on edges that directly encode a declared relation.
pub const PRIMARY_REL: &str = "_pg_primary_rel";
/// `true` on edges whose target is owned and deleted with its source.
pub const CASCADE: &str = "_pg_cascade";
pub const EMBEDDED_REL: &str = "_pg_embedded";
/// `true` on source-to-target edges that skip a reified-relation chain.
pub const SHORTCUT: &str = "_pg_shortcut";
/// On synonym edges: the relation they are a superclass of.
pub const SUPERCLASS_OF: &str = "_pg_superclass_of";
/// Marks the creation that a reference-create MERGE performed.
pub const CREATION_MARKER: &str = "_pg_creation_id";
/// Written and removed on a head to take its write lock.
pub const WRITE_LOCK: &str = "_pg_write_lock";

/// The role a node plays in the tree being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Head,
    Embedded,
    Inline { edit_inline: bool },
    Reified,
    SemanticSpace,
    ReferenceCreate,
}

impl NodeRole {
    pub fn is_head(&self) -> bool {
        matches!(self, Self::Head)
    }

    /// Labels that encode the role, added after the type's own labels.
    pub fn extra_labels(&self) -> &'static [&'static str] {
        match self {
            Self::Head | Self::ReferenceCreate => &[HEAD_NODE, INDEXABLE],
            Self::Embedded => &[EMBEDDED, READ_INLINE, DETACH_DELETE, INDEXABLE],
            Self::Inline { edit_inline: false } => {
                &[READ_INLINE, CREATE_INLINE, DETACH_DELETE, INDEXABLE]
            }
            Self::Inline { edit_inline: true } => {
                &[READ_INLINE, CREATE_INLINE, EDIT_INLINE, DETACH_DELETE, INDEXABLE]
            }
            Self::Reified => &[
                REIFIED_RELATION,
                READ_INLINE,
                CREATE_INLINE,
                EDIT_INLINE,
                DETACH_DELETE,
                INDEXABLE,
            ],
            Self::SemanticSpace => &[
                SEMANTIC_SPACE,
                READ_INLINE,
                CREATE_INLINE,
                EDIT_INLINE,
                DETACH_DELETE,
                INDEXABLE,
            ],
        }
    }
}

/// `:A:B:C` for a type's labels plus its role labels, without repeats.
pub fn label_string(descriptor: &TypeDescriptor, role: NodeRole) -> String {
    let mut labels: Vec<&str> = Vec::new();
    for label in descriptor
        .labels
        .iter()
        .map(String::as_str)
        .chain(role.extra_labels().iter().copied())
    {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels.iter().map(|l| format!(":{l}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{SchemaDocument, SchemaRegistry, TypeDefinition};

    fn person() -> TypeDescriptor {
        let registry = SchemaRegistry::compile(
            &SchemaDocument::default().with_type(TypeDefinition::entity("Person")),
        )
        .unwrap();
        registry.get("Person").unwrap().clone()
    }

    #[test]
    fn test_head_labels() {
        assert_eq!(
            label_string(&person(), NodeRole::Head),
            ":Person:BaseNode:HeadNode:PGIndexableNode"
        );
    }

    #[test]
    fn test_edit_inline_adds_label() {
        let plain = label_string(&person(), NodeRole::Inline { edit_inline: false });
        let editable = label_string(&person(), NodeRole::Inline { edit_inline: true });
        assert!(!plain.contains(EDIT_INLINE));
        assert!(editable.contains(":EditInline"));
        assert!(editable.contains(":DetachDelete"));
    }

    #[test]
    fn test_embedded_is_not_a_head() {
        let labels = label_string(&person(), NodeRole::Embedded);
        assert!(labels.contains(":Embedded"));
        assert!(!labels.contains(HEAD_NODE));
        assert!(!NodeRole::Embedded.is_head());
    }

    #[test]
    fn test_semantic_space_labels() {
        let registry = SchemaRegistry::compile(
            &SchemaDocument::default()
                .with_type(TypeDefinition::entity("Person"))
                .with_type(TypeDefinition::semantic_space("Negation", "negated_in", &["Person"])),
        )
        .unwrap();
        let labels = label_string(registry.get("Negation").unwrap(), NodeRole::SemanticSpace);
        assert_eq!(
            labels,
            ":Negation:SemanticSpace:ReadInline:CreateInline:EditInline:DetachDelete:PGIndexableNode"
        );
    }
}
