//! Statement construction for create and update plans, without a database.
//!
//! Run with: cargo test --package tessera-graph --test write_engine

mod common;

use common::{find_param, lines_with, registry};
use serde_json::{json, Value};
use tessera_audit::Patch;
use tessera_core::{
    Entity, ExternalId, ExternalRef, MultiKeyValue, PropertyValue, SchemaError, SchemaRegistry,
    TesseraError, WriteSettings,
};
use tessera_graph::{entity_view, GraphError, WriteEngine};

fn settings() -> WriteSettings {
    WriteSettings::default()
}

fn contains_string(value: &Value, needle: &str) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.contains(&json!(needle)))
}

// ── Create ───────────────────────────────────────────────────────

#[test]
fn test_create_head_node() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let person = Entity::new("Person")
        .with_label("Ada Lovelace")
        .with_uri("https://ex.org/people/ada")
        .with_property("name", "Ada");

    let plan = engine.plan_create(&person, Some("ada")).unwrap();
    let primary = &plan.primary;

    assert_eq!(plan.head_type, "Person");
    assert!(primary
        .text
        .contains("CREATE (x0:Person:BaseNode:HeadNode:PGIndexableNode $x1)"));
    assert!(primary.text.ends_with("RETURN x0{.*} AS head"));

    let props = &primary.params["x1"];
    assert_eq!(props["id"], json!(plan.head_id.to_string()));
    assert_eq!(props["type"], json!("Person"));
    assert_eq!(props["label"], json!("Ada Lovelace"));
    assert_eq!(props["name"], json!("Ada"));
    assert_eq!(props["is_deleted"], json!(false));
    assert!(props.get("head_id").is_none());

    let canonical = format!("http://example.org/entities/Person/{}", plan.head_id);
    assert!(find_param(primary, |v| v == &json!(canonical)).is_some());
    assert!(find_param(primary, |v| v == &json!("https://ex.org/people/ada")).is_some());
    assert_eq!(lines_with(primary, "-[:URIS]->").len(), 2);

    let record = find_param(primary, |v| v.get("creation").is_some()).unwrap();
    let patch = Patch::from_text(record["creation"].as_str().unwrap()).unwrap();
    assert!(patch.ops().iter().any(|op| op.path() == "/name"));
    // The canonical URI is derived and stays out of the audited view.
    assert!(!record["creation"].as_str().unwrap().contains("example.org/entities"));

    assert!(plan.deferred.is_none());
}

#[test]
fn test_create_inline_children_get_head_and_derived_edges() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let order = Entity::new("Order")
        .with_property("status", "open")
        .with_child("items", Entity::new("Item").with_property("sku", "A-1"))
        .with_child("items", Entity::new("Item").with_property("sku", "B-2"));

    let plan = engine.plan_create(&order, None).unwrap();
    let item_creates: Vec<_> = lines_with(&plan.primary, "CREATE (")
        .into_iter()
        .filter(|l| l.contains(":Item:BaseNode:ReadInline:CreateInline:EditInline:DetachDelete"))
        .collect();
    assert_eq!(item_creates.len(), 2);

    let item = find_param(&plan.primary, |v| v.get("sku") == Some(&json!("A-1"))).unwrap();
    assert_eq!(item["head_id"], json!(plan.head_id.to_string()));
    assert_eq!(item["head_type"], json!("Order"));

    let edge = find_param(&plan.primary, |v| v.get("reverse_name") == Some(&json!("item_of")))
        .unwrap();
    assert_eq!(edge["_pg_primary_rel"], json!(true));
    assert_eq!(edge["_pg_cascade"], json!(true));

    let deferred = plan.deferred.unwrap();
    assert_eq!(lines_with(&deferred, ":ITEM_OF $").len(), 2);
    assert!(deferred.text.ends_with("RETURN true AS deferred"));
}

#[test]
fn test_create_embedded_child() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let order = Entity::new("Order").with_child("notes", Entity::new("Note").with_property("text", "fragile"));

    let plan = engine.plan_create(&order, None).unwrap();
    assert!(plan
        .primary
        .text
        .contains(":Note:BaseNode:Embedded:ReadInline:DetachDelete:PGIndexableNode $"));
    assert!(plan.primary.text.contains(":NOTES $"));

    let edge = find_param(&plan.primary, |v| v.get("_pg_embedded").is_some()).unwrap();
    assert_eq!(edge["reverse_name"], json!("embedded_in"));
    assert_eq!(edge["_pg_cascade"], json!(true));

    // Embedded values have no derived edges.
    assert!(plan.deferred.is_none());
}

#[test]
fn test_reified_relation_defers_shortcut() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let person = ExternalId::new();
    let order = Entity::new("Order").with_child(
        "identified_by",
        Entity::new("Identification").with_child("target", Entity::reference("Person", person)),
    );

    let plan = engine.plan_create(&order, None).unwrap();
    assert!(plan
        .primary
        .text
        .contains(":Identification:ReifiedRelation:ReadInline:CreateInline:EditInline:DetachDelete:PGIndexableNode $"));
    assert!(plan.primary.text.contains(":PGIndexableNode {id: $"));

    let deferred = plan.deferred.unwrap();
    assert!(deferred
        .text
        .contains(":IDENTIFIED_BY {_pg_primary_rel: true}]->("));
    assert!(deferred.text.contains("-[:TARGET*1..]->("));
    assert!(deferred.text.contains("WITH DISTINCT"));
    assert_eq!(lines_with(&deferred, ":IDENTIFIES $").len(), 1);
    // The wrapper's own target edge gets its reverse.
    assert_eq!(lines_with(&deferred, ":IS_TARGET_OF $").len(), 1);

    let shortcut = find_param(&deferred, |v| v.get("_pg_shortcut") == Some(&json!(true))).unwrap();
    assert_eq!(shortcut["_pg_primary_rel"], json!(false));
    assert_eq!(shortcut["head_id"], json!(plan.head_id.to_string()));
}

#[test]
fn test_reference_create_merges_and_guards_its_audit() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let person = ExternalId::new();
    let order = Entity::new("Order").with_child(
        "customer",
        Entity::reference_create("Person", person)
            .with_property("name", "Bob")
            .with_edge_property("role", "buyer"),
    );

    let plan = engine.plan_create(&order, None).unwrap();
    let primary = &plan.primary;
    assert!(primary.text.contains("ON CREATE SET"));
    assert!(primary.text.contains(":Person:BaseNode:HeadNode:PGIndexableNode"));
    assert!(primary.text.contains("FOREACH (_ IN CASE WHEN"));
    assert_eq!(lines_with(primary, "PG_CREATED_IN").len(), 2);
    assert_eq!(lines_with(primary, "PGUser").len(), 1);

    let merged = find_param(primary, |v| v.get("_pg_creation_id").is_some()).unwrap();
    assert_eq!(merged["id"], json!(person.to_string()));
    assert_eq!(merged["name"], json!("Bob"));
    let marker = merged["_pg_creation_id"].clone();
    let records: Vec<_> = primary
        .params
        .values()
        .filter(|v| v.get("creation").is_some())
        .collect();
    assert!(records.iter().any(|r| r["id"] == marker));

    let canonical = format!("http://example.org/entities/Person/{person}");
    assert!(find_param(primary, |v| v == &json!(canonical)).is_some());

    let edge = find_param(primary, |v| v.get("role") == Some(&json!("buyer"))).unwrap();
    assert!(edge.get("_pg_cascade").is_none());

    let deferred = plan.deferred.unwrap();
    assert_eq!(lines_with(&deferred, ":PLACED_ORDER $").len(), 1);
}

#[test]
fn test_reference_by_uri() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let uri = "https://ex.org/people/ada";
    let order = Entity::new("Order")
        .with_child("customer", Entity::reference("Person", ExternalRef::Uri(uri.to_string())));

    let plan = engine.plan_create(&order, None).unwrap();
    assert!(plan.primary.text.contains("<-[:URIS]-(found:PGIndexableNode)"));
    assert!(find_param(&plan.primary, |v| v == &json!(uri)).is_some());

    let deferred = plan.deferred.unwrap();
    assert!(deferred.text.contains("MATCH (:PGUri:PGCore:PGInternal {uri: $"));
}

#[test]
fn test_subclassed_relation_writes_synonyms() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let meeting = Entity::new("Meeting").with_child("attendee", Entity::reference("Person", ExternalId::new()));

    let plan = engine.plan_create(&meeting, None).unwrap();
    assert!(plan.primary.text.contains(":ATTENDEE $"));
    assert!(plan.primary.text.contains(":Meeting:Event:BaseNode:HeadNode:PGIndexableNode"));

    let edge = find_param(&plan.primary, |v| v.get("relation_labels").is_some()).unwrap();
    assert_eq!(edge["relation_labels"], json!(["attendee", "involves"]));

    let deferred = plan.deferred.unwrap();
    for rel in [":ATTENDED $", ":INVOLVES $", ":INVOLVED_IN $"] {
        assert_eq!(lines_with(&deferred, rel).len(), 1, "{rel}");
    }
}

#[test]
fn test_invalid_children_are_rejected() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);

    let inline_person = Entity::new("Order").with_child("customer", Entity::new("Person"));
    assert!(matches!(
        engine.plan_create(&inline_person, None),
        Err(GraphError::Write(TesseraError::InvalidEntity { .. }))
    ));

    let unknown_field = Entity::new("Order").with_child("buyer", Entity::new("Person"));
    assert!(matches!(
        engine.plan_create(&unknown_field, None),
        Err(GraphError::Write(TesseraError::InvalidEntity { .. }))
    ));

    let missing_id = Entity {
        id: None,
        ..Entity::reference("Person", ExternalId::new())
    };
    let order = Entity::new("Order").with_child("customer", missing_id);
    assert!(engine.plan_create(&order, None).is_err());
}

#[test]
fn test_uninitialized_schema_is_an_error() {
    let registry = SchemaRegistry::new();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    assert!(matches!(
        engine.plan_create(&Entity::new("Person"), None),
        Err(GraphError::Write(TesseraError::Schema(SchemaError::NotInitialized)))
    ));
}

#[test]
fn test_inline_child_of_reified_relation_gets_derived_edges() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let order = Entity::new("Order").with_child(
        "identified_by",
        Entity::new("Identification")
            .with_child("target", Entity::reference("Person", ExternalId::new()))
            .with_child("witness", Entity::new("Item").with_property("sku", "W-1")),
    );

    let plan = engine.plan_create(&order, None).unwrap();
    let deferred = plan.deferred.unwrap();
    assert_eq!(lines_with(&deferred, ":WITNESSED $").len(), 1);
    // The reified wrapper itself is still bypassed by a shortcut, not a reverse edge.
    assert_eq!(lines_with(&deferred, ":IDENTIFIES $").len(), 1);
}

#[test]
fn test_semantic_space_scopes_its_contents() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let order = Entity::new("Order").with_property("status", "open").with_child(
        "unless",
        Entity::new("Negation").with_child("contents", Entity::new("Item").with_property("sku", "N-1")),
    );

    let plan = engine.plan_create(&order, None).unwrap();
    let primary = &plan.primary;
    assert!(primary
        .text
        .contains(":Negation:SemanticSpace:ReadInline:CreateInline:EditInline:DetachDelete:PGIndexableNode $"));

    let head = find_param(primary, |v| v.get("status") == Some(&json!("open"))).unwrap();
    assert_eq!(head["semantic_spaces"], json!([]));
    let space = find_param(primary, |v| v.get("type") == Some(&json!("Negation"))).unwrap();
    assert_eq!(space["semantic_spaces"], json!([]));
    assert_eq!(space["head_id"], json!(plan.head_id.to_string()));
    let item = find_param(primary, |v| v.get("sku") == Some(&json!("N-1"))).unwrap();
    assert_eq!(item["semantic_spaces"], json!(["Negation"]));

    let framing = find_param(primary, |v| v.get("reverse_name") == Some(&json!("frames"))).unwrap();
    assert_eq!(framing["semantic_spaces"], json!([]));
    assert_eq!(framing["_pg_cascade"], json!(true));
    let contents =
        find_param(primary, |v| v.get("reverse_name") == Some(&json!("negated_in"))).unwrap();
    assert_eq!(contents["semantic_spaces"], json!(["Negation"]));

    let deferred = plan.deferred.unwrap();
    assert_eq!(lines_with(&deferred, ":FRAMES $").len(), 1);
    assert_eq!(lines_with(&deferred, ":NEGATED_IN $").len(), 1);
    let derived = find_param(&deferred, |v| {
        v.get("_pg_primary_rel") == Some(&json!(false))
            && v.get("reverse_name") == Some(&json!("negated_in"))
    })
    .unwrap();
    assert_eq!(derived["semantic_spaces"], json!(["Negation"]));
}

// ── Update ───────────────────────────────────────────────────────

#[test]
fn test_unchanged_update_is_a_no_op() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let order = Entity::existing("Order", ExternalId::new())
        .with_property("status", "open")
        .with_child("customer", Entity::reference("Person", ExternalId::new()))
        .with_child("items", Entity::existing("Item", ExternalId::new()).with_property("sku", "A-1"));
    let previous = entity_view(&order).unwrap();

    assert!(engine.plan_update(&order, &previous, None).unwrap().is_none());
}

#[test]
fn test_update_swaps_referenced_customer() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let id = ExternalId::new();
    let person_a = ExternalId::new();
    let person_b = ExternalId::new();

    let before = Entity::existing("Order", id)
        .with_property("status", "open")
        .with_child("customer", Entity::reference("Person", person_a));
    let previous = entity_view(&before).unwrap();
    let after = Entity::existing("Order", id)
        .with_property("status", "open")
        .with_child("customer", Entity::reference("Person", person_b));

    let plan = engine.plan_update(&after, &previous, Some("ada")).unwrap().unwrap();
    let primary = &plan.primary;
    assert_eq!(plan.head_id, id);
    assert!(primary.text.starts_with("MATCH (x0:PGIndexableNode:HeadNode {id: $"));
    assert!(primary.text.contains(":CUSTOMER {_pg_primary_rel: true}]->("));
    assert!(primary.text.contains("._pg_primary_rel = false"));
    assert!(primary.text.contains("MATCH (anchor)-["));

    // PersonB is kept; PersonA is only detached, never named.
    let keep = find_param(primary, |v| contains_string(v, &person_b.to_string())).unwrap();
    assert_eq!(keep.as_array().unwrap().len(), 1);
    assert!(find_param(primary, |v| v == &json!(person_a.to_string())
        || contains_string(v, &person_a.to_string()))
    .is_none());

    let record = find_param(primary, |v| v.get("modification").is_some()).unwrap();
    let patch = Patch::from_text(record["modification"].as_str().unwrap()).unwrap();
    assert_eq!(patch.len(), 1);
    assert_eq!(patch.ops()[0].path(), "/customer/0/id");

    let deferred = plan.deferred.unwrap();
    assert_eq!(lines_with(&deferred, ":PLACED_ORDER $").len(), 1);
}

#[test]
fn test_update_reconciles_item_set() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let id = ExternalId::new();
    let [a, b, c] = [ExternalId::new(), ExternalId::new(), ExternalId::new()];
    let item = |id: ExternalId, sku: &str| Entity::existing("Item", id).with_property("sku", sku);

    let before = Entity::existing("Order", id)
        .with_child("items", item(a, "a"))
        .with_child("items", item(b, "b"))
        .with_child("items", item(c, "c"));
    let previous = entity_view(&before).unwrap();
    let after = Entity::existing("Order", id)
        .with_child("items", item(b, "b"))
        .with_child("items", item(c, "c"))
        .with_child("items", Entity::new("Item").with_property("sku", "d"));

    let plan = engine.plan_update(&after, &previous, None).unwrap().unwrap();
    let primary = &plan.primary;

    let created: Vec<_> = lines_with(primary, "CREATE (")
        .into_iter()
        .filter(|l| l.contains(":Item:"))
        .collect();
    assert_eq!(created.len(), 1);

    let edited: Vec<_> = lines_with(primary, "MERGE (")
        .into_iter()
        .filter(|l| l.contains(":PGIndexableNode {id: $"))
        .collect();
    assert_eq!(edited.len(), 2);

    let keep = find_param(primary, |v| contains_string(v, &b.to_string())).unwrap();
    let keep = keep.as_array().unwrap();
    assert_eq!(keep.len(), 3);
    assert!(keep.contains(&json!(c.to_string())));
    assert!(!keep.contains(&json!(a.to_string())));
    assert!(primary.text.contains("DETACH DELETE"));
    assert!(primary.text.contains("PG_MODIFIED_IN"));

    let deferred = plan.deferred.unwrap();
    assert_eq!(lines_with(&deferred, ":ITEM_OF $").len(), 3);
}

#[test]
fn test_update_requires_existing_head() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let err = engine
        .plan_update(&Entity::new("Order"), &json!({}), None)
        .unwrap_err();
    assert!(matches!(err, GraphError::Write(TesseraError::InvalidEntity { .. })));
}

#[test]
fn test_update_cleanup_spares_shared_descendants() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let id = ExternalId::new();
    let dropped = ExternalId::new();
    let before = Entity::existing("Order", id)
        .with_child("items", Entity::existing("Item", dropped).with_property("sku", "a"));
    let previous = entity_view(&before).unwrap();
    let after = Entity::existing("Order", id);

    let plan = engine.plan_update(&after, &previous, None).unwrap().unwrap();
    let primary = &plan.primary;
    // Every node on the owned path is checked, not only the one deleted.
    assert!(primary.text.contains("AND none(step IN nodes("));
    assert!(primary.text.contains("coalesce(other._pg_cascade, false) = false"));
    assert!(primary.text.contains("DETACH DELETE"));
}

#[test]
fn test_update_nulls_dropped_multi_key_parts() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let id = ExternalId::new();
    let born = |mk: MultiKeyValue| PropertyValue::MultiKey(mk);
    let before = Entity::existing("Person", id)
        .with_property("born", born(MultiKeyValue::new("1815").with_part("precision", "year")));
    let previous = entity_view(&before).unwrap();
    let after = Entity::existing("Person", id).with_property("born", born(MultiKeyValue::new("1815")));

    let plan = engine.plan_update(&after, &previous, None).unwrap().unwrap();
    let primary = &plan.primary;
    let props = find_param(primary, |v| v.get("born____value").is_some()).unwrap();
    assert_eq!(props["born____value"], json!("1815"));
    assert_eq!(props.get("born____precision"), Some(&Value::Null));

    let record = find_param(primary, |v| v.get("modification").is_some()).unwrap();
    let patch = Patch::from_text(record["modification"].as_str().unwrap()).unwrap();
    assert!(patch.ops().iter().any(|op| op.path() == "/born/precision"));
}

#[test]
fn test_update_detaches_dropped_uris() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let id = ExternalId::new();
    let before = Entity::existing("Person", id)
        .with_uri("https://ex.org/a")
        .with_uri("https://ex.org/b");
    let previous = entity_view(&before).unwrap();
    let after = Entity::existing("Person", id).with_uri("https://ex.org/b");

    let plan = engine.plan_update(&after, &previous, None).unwrap().unwrap();
    let primary = &plan.primary;
    assert!(lines_with(primary, ".uri IN $")
        .iter()
        .any(|l| l.trim_start().starts_with("WHERE NOT x")));

    let canonical = format!("http://example.org/entities/Person/{id}");
    let keep = find_param(primary, |v| contains_string(v, &canonical)).unwrap();
    assert!(contains_string(keep, "https://ex.org/b"));
    assert!(!contains_string(keep, "https://ex.org/a"));
}

#[test]
fn test_update_edits_space_contents_in_scope() {
    let registry = registry();
    let settings = settings();
    let engine = WriteEngine::new(&registry, &settings);
    let id = ExternalId::new();
    let space = ExternalId::new();
    let item = ExternalId::new();
    let order = |sku: &str| {
        Entity::existing("Order", id).with_child(
            "unless",
            Entity::existing("Negation", space)
                .with_child("contents", Entity::existing("Item", item).with_property("sku", sku)),
        )
    };
    let previous = entity_view(&order("a")).unwrap();

    let plan = engine.plan_update(&order("b"), &previous, None).unwrap().unwrap();
    let primary = &plan.primary;
    assert!(lines_with(primary, "SET x")
        .iter()
        .any(|l| l.contains(":Negation:SemanticSpace:")));
    let edited = find_param(primary, |v| v.get("sku") == Some(&json!("b"))).unwrap();
    assert_eq!(edited["semantic_spaces"], json!(["Negation"]));
    let head = find_param(primary, |v| {
        v.get("type") == Some(&json!("Order")) && v.get("id") == Some(&json!(id.to_string()))
    })
    .unwrap();
    assert_eq!(head["semantic_spaces"], json!([]));

    let deferred = plan.deferred.unwrap();
    assert_eq!(lines_with(&deferred, ":FRAMES $").len(), 1);
    assert_eq!(lines_with(&deferred, ":NEGATED_IN $").len(), 1);
}
