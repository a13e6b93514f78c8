//! JSON views of entity trees, as diffed into audit records.
//!
//! A view holds `type`, `id`, `label`, `uris`, every property by name,
//! every non-empty relation field as an array of child views, and the
//! child's `edge_properties`. Arrays are ordered by child id so that
//! reordering children is not a change.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tessera_core::{Entity, ExternalRef, TesseraError};

use crate::properties::view_value;

/// View of an entity tree using the ids it already carries.
pub fn entity_view(entity: &Entity) -> Result<Value, TesseraError> {
    let mut relations = BTreeMap::new();
    for (field, children) in &entity.relations {
        let views = children
            .iter()
            .map(entity_view)
            .collect::<Result<Vec<_>, _>>()?;
        relations.insert(field.clone(), views);
    }
    node_view(entity, entity.id.as_ref(), relations)
}

/// View of one node with an explicit id and already-built child views.
pub fn node_view(
    entity: &Entity,
    id: Option<&ExternalRef>,
    relations: BTreeMap<String, Vec<Value>>,
) -> Result<Value, TesseraError> {
    let mut out = Map::new();
    out.insert("type".to_string(), Value::String(entity.type_name.clone()));
    if let Some(id) = id {
        out.insert("id".to_string(), Value::String(id.to_string()));
    }
    if let Some(label) = &entity.label {
        out.insert("label".to_string(), Value::String(label.clone()));
    }
    if !entity.uris.is_empty() {
        let mut uris = entity.uris.clone();
        uris.sort();
        uris.dedup();
        out.insert(
            "uris".to_string(),
            Value::Array(uris.into_iter().map(Value::String).collect()),
        );
    }
    for (name, value) in &entity.properties {
        if !value.is_null() {
            out.insert(name.clone(), view_value(name, value)?);
        }
    }
    for (field, mut views) in relations {
        if views.is_empty() {
            continue;
        }
        views.sort_by(|a, b| child_sort_key(a).cmp(&child_sort_key(b)));
        out.insert(field, Value::Array(views));
    }
    if !entity.edge_properties.is_empty() {
        let mut edge = Map::new();
        for (name, value) in &entity.edge_properties {
            edge.insert(name.clone(), view_value(name, value)?);
        }
        out.insert("edge_properties".to_string(), Value::Object(edge));
    }
    Ok(Value::Object(out))
}

fn child_sort_key(view: &Value) -> (bool, &str) {
    match view.get("id").and_then(Value::as_str) {
        Some(id) => (false, id),
        None => (true, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{ExternalId, PropertyValue};

    #[test]
    fn test_view_flattens_properties_and_children() {
        let person = ExternalId::new();
        let order = Entity::new("Order")
            .with_label("Order 1")
            .with_property("quantity", 2i64)
            .with_child(
                "customer",
                Entity::reference("Person", person).with_edge_property("role", "buyer"),
            );

        let view = entity_view(&order).unwrap();
        assert_eq!(
            view,
            json!({
                "type": "Order",
                "label": "Order 1",
                "quantity": 2,
                "customer": [
                    {"type": "Person", "id": person.to_string(), "edge_properties": {"role": "buyer"}}
                ]
            })
        );
    }

    #[test]
    fn test_child_order_does_not_matter() {
        let a = ExternalId::new();
        let b = ExternalId::new();
        let forward = Entity::new("Order")
            .with_child("items", Entity::reference("Item", a))
            .with_child("items", Entity::reference("Item", b));
        let backward = Entity::new("Order")
            .with_child("items", Entity::reference("Item", b))
            .with_child("items", Entity::reference("Item", a));
        assert_eq!(entity_view(&forward).unwrap(), entity_view(&backward).unwrap());
    }

    #[test]
    fn test_empty_fields_and_nulls_are_omitted() {
        let entity = Entity::new("Order")
            .with_relation("items", Vec::new())
            .with_property("note", PropertyValue::Null);
        assert_eq!(entity_view(&entity).unwrap(), json!({"type": "Order"}));
    }
}
