//! Shared schema for the write-engine tests.

#![allow(dead_code)]

use serde_json::Value;
use tessera_core::{
    PropertyDescriptor, RelationDefinition, SchemaDocument, SchemaRegistry, TypeDefinition,
};
use tessera_graph::CompiledQuery;

/// Orders, people, inline items, embedded notes, a reified identification
/// with an inline witness, a negation space and a subclassed meeting
/// relation.
pub fn document() -> SchemaDocument {
    SchemaDocument::default()
        .with_type(
            TypeDefinition::entity("Person")
                .property(PropertyDescriptor::literal("name"))
                .property(PropertyDescriptor::multi_key("born", &["precision"]))
                .property(PropertyDescriptor::list("tags")),
        )
        .with_type(TypeDefinition::entity("Item").property(PropertyDescriptor::literal("sku")))
        .with_type(TypeDefinition::entity("Note").property(PropertyDescriptor::literal("text")))
        .with_type(
            TypeDefinition::entity("Order")
                .property(PropertyDescriptor::literal("status"))
                .relation(
                    RelationDefinition::new("customer", "placed_order", &["Person"])
                        .create_by_reference()
                        .edge_property(PropertyDescriptor::literal("role")),
                )
                .relation(
                    RelationDefinition::new("items", "item_of", &["Item"])
                        .create_inline()
                        .edit_inline(),
                )
                .relation(RelationDefinition::new(
                    "identified_by",
                    "identifies",
                    &["Identification"],
                ))
                .relation(RelationDefinition::new("unless", "frames", &["Negation"]))
                .embedded("notes", &["Note"]),
        )
        .with_type(
            TypeDefinition::reified("Identification", "target", "is_target_of", &["Person"])
                .relation(
                    RelationDefinition::new("witness", "witnessed", &["Item"])
                        .create_inline()
                        .edit_inline(),
                ),
        )
        .with_type(TypeDefinition::semantic_space("Negation", "negated_in", &["Item"]))
        .with_type(TypeDefinition::entity("Event").relation(RelationDefinition::new(
            "involves",
            "involved_in",
            &["Person"],
        )))
        .with_type(
            TypeDefinition::entity("Meeting")
                .extends("Event")
                .relation(
                    RelationDefinition::new("attendee", "attended", &["Person"])
                        .subclassing("involves"),
                ),
        )
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::compile(&document()).expect("test schema compiles")
}

/// The first parameter for which `pred` holds.
pub fn find_param<'q>(query: &'q CompiledQuery, pred: impl Fn(&Value) -> bool) -> Option<&'q Value> {
    query.params.values().find(|v| pred(v))
}

/// Lines of the statement that contain `needle`.
pub fn lines_with<'q>(query: &'q CompiledQuery, needle: &str) -> Vec<&'q str> {
    query.text.lines().filter(|l| l.contains(needle)).collect()
}
