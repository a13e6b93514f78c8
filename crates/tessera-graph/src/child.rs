//! How a child entity is written, decided from its field and its kind.

use tessera_core::{Entity, EntityKind, FieldDescriptor, FieldKind, TesseraError, TypeDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildWrite {
    /// New owned value node in an embedded field.
    Embedded,
    /// New node created through a create-inline relation.
    Inline,
    /// New reified-relation wrapper.
    Reified,
    /// New semantic-space node framing its contents.
    SemanticSpace,
    /// Link to a node that must exist.
    Reference,
    /// Link to a node, creating it if absent.
    ReferenceCreate,
    EditEmbedded,
    EditInline,
    EditReified,
    EditSemanticSpace,
}

impl ChildWrite {
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            Self::EditEmbedded | Self::EditInline | Self::EditReified | Self::EditSemanticSpace
        )
    }
}

/// Pick the write strategy for `child` in `field`, rejecting combinations
/// the field does not allow.
pub fn classify(
    field: &FieldDescriptor,
    child: &Entity,
    child_type: &TypeDescriptor,
) -> Result<ChildWrite, TesseraError> {
    let reject = |reason: &str| {
        Err(TesseraError::invalid_entity(
            &child.type_name,
            format!("{reason} (field '{}')", field.name),
        ))
    };

    if !field.accepts(&child.type_name) {
        return reject("type is not a declared target");
    }

    match (field.kind, child.kind) {
        (FieldKind::Embedded, EntityKind::New) => Ok(ChildWrite::Embedded),
        (FieldKind::Embedded, EntityKind::Existing) => Ok(ChildWrite::EditEmbedded),
        (FieldKind::Embedded, _) => reject("embedded fields hold owned values only"),

        (FieldKind::Relation, EntityKind::New) if child_type.reified => Ok(ChildWrite::Reified),
        (FieldKind::Relation, EntityKind::New) if child_type.semantic_space => {
            Ok(ChildWrite::SemanticSpace)
        }
        (FieldKind::Relation, EntityKind::New) if field.create_inline || field.edit_inline => {
            Ok(ChildWrite::Inline)
        }
        (FieldKind::Relation, EntityKind::New) => reject("relation does not create inline"),

        (FieldKind::Relation, EntityKind::Reference) => Ok(ChildWrite::Reference),
        (FieldKind::Relation, EntityKind::ReferenceCreate) if field.create_by_reference => {
            Ok(ChildWrite::ReferenceCreate)
        }
        (FieldKind::Relation, EntityKind::ReferenceCreate) => {
            reject("relation does not create by reference")
        }

        (FieldKind::Relation, EntityKind::Existing) if child_type.reified => {
            Ok(ChildWrite::EditReified)
        }
        (FieldKind::Relation, EntityKind::Existing) if child_type.semantic_space => {
            Ok(ChildWrite::EditSemanticSpace)
        }
        (FieldKind::Relation, EntityKind::Existing) if field.edit_inline => {
            Ok(ChildWrite::EditInline)
        }
        (FieldKind::Relation, EntityKind::Existing) => reject("relation is not edit-inline"),
    }
}
