//! Primary edge properties and the deferred derived-edge units.
//!
//! Every declared relation is written once as a primary edge. The deferred
//! statement then adds the derived edges: the reverse edge, one edge per
//! subclassed (synonym) relation in each direction, and for reified
//! relations a shortcut from the source straight to the final target.
//! Derived edges carry `_pg_primary_rel: false` and the head's id so the
//! next update of that head can drop and regenerate them.

use serde_json::{Map, Value};
use tessera_core::{Entity, ExternalId, ExternalRef, FieldDescriptor, TesseraError};

use crate::accumulator::QueryAccumulator;
use crate::client::GraphError;
use crate::labels::{
    CASCADE, EMBEDDED_REL, INDEXABLE, PRIMARY_REL, REIFIED_RELATION, SHORTCUT, SUPERCLASS_OF,
    URIS_REL, URI_NODE,
};
use crate::properties::{serialize_properties, Absent};
use crate::spaces::SemanticSpaces;

/// Whether the edge owns its target (deleted with the source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Embedded,
    Referenced,
}

/// Properties of the primary edge from a source to `child`, inside `spaces`.
pub fn primary_edge_properties(
    field: &FieldDescriptor,
    child: &Entity,
    ownership: Ownership,
    spaces: &SemanticSpaces,
) -> Result<Map<String, Value>, TesseraError> {
    let mut props = serialize_properties(
        &format!("{} (edge of '{}')", child.type_name, field.name),
        &field.edge_properties,
        &child.edge_properties,
        Absent::Omit,
    )?;
    props.insert(
        "reverse_name".to_string(),
        Value::String(field.reverse_name.clone()),
    );
    props.insert(
        "relation_labels".to_string(),
        string_list(&field.relation_labels),
    );
    props.insert(
        "reverse_relation_labels".to_string(),
        string_list(&field.reverse_relation_labels),
    );
    props.insert(PRIMARY_REL.to_string(), Value::Bool(true));
    spaces.insert_into(&mut props);
    match ownership {
        Ownership::Owned => {
            props.insert(CASCADE.to_string(), Value::Bool(true));
        }
        Ownership::Embedded => {
            props.insert(CASCADE.to_string(), Value::Bool(true));
            props.insert(EMBEDDED_REL.to_string(), Value::Bool(true));
        }
        Ownership::Referenced => {}
    }
    Ok(props)
}

fn string_list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// Derived-edge properties: the primary ones, demoted and tagged with the head.
fn derived_properties(
    primary: &Map<String, Value>,
    head_id: ExternalId,
    extra: &[(&str, Value)],
) -> Map<String, Value> {
    let mut props = primary.clone();
    props.remove(CASCADE);
    props.remove(EMBEDDED_REL);
    props.insert(PRIMARY_REL.to_string(), Value::Bool(false));
    props.insert("head_id".to_string(), Value::String(head_id.to_string()));
    for (key, value) in extra {
        props.insert((*key).to_string(), value.clone());
    }
    props
}

fn head_of(acc: &QueryAccumulator) -> Result<ExternalId, GraphError> {
    acc.head_id().ok_or_else(|| {
        GraphError::Accumulator("derived edges requested before the head was set".to_string())
    })
}

/// `CREATE` lines for the reverse edge and every synonym pair between `s` and `t`.
fn derived_creates(
    acc: &mut QueryAccumulator,
    field: &FieldDescriptor,
    primary: &Map<String, Value>,
    head_id: ExternalId,
    s: &str,
    t: &str,
    shortcut: bool,
) -> Vec<String> {
    let marker: Vec<(&str, Value)> = if shortcut {
        vec![(SHORTCUT, Value::Bool(true))]
    } else {
        Vec::new()
    };
    let mut lines = Vec::new();

    if shortcut {
        let fwd = acc.register_deferred_param(derived_properties(primary, head_id, &marker));
        lines.push(format!("  CREATE ({s})-[:{} ${fwd}]->({t})", field.relation_type()));
    }
    let rev = acc.register_deferred_param(derived_properties(primary, head_id, &marker));
    lines.push(format!(
        "  CREATE ({t})-[:{} ${rev}]->({s})",
        field.reverse_relation_type()
    ));

    for (forward, reverse) in &field.subclassed_relations {
        let mut extra = marker.clone();
        extra.push((SUPERCLASS_OF, Value::String(field.name.clone())));
        let fwd = acc.register_deferred_param(derived_properties(primary, head_id, &extra));
        lines.push(format!(
            "  CREATE ({s})-[:{} ${fwd}]->({t})",
            forward.to_uppercase()
        ));

        let mut extra = marker.clone();
        extra.push((SUPERCLASS_OF, Value::String(field.reverse_name.clone())));
        let rev = acc.register_deferred_param(derived_properties(primary, head_id, &extra));
        lines.push(format!(
            "  CREATE ({t})-[:{} ${rev}]->({s})",
            reverse.to_uppercase()
        ));
    }
    lines
}

/// Defer the reverse and synonym edges between `source` and a direct `target`.
pub fn append_derived_edges(
    acc: &mut QueryAccumulator,
    field: &FieldDescriptor,
    source: ExternalId,
    target: &ExternalRef,
    primary: &Map<String, Value>,
) -> Result<(), GraphError> {
    let head_id = head_of(acc)?;
    let s = acc.next_identifier();
    let t = acc.next_identifier();
    let sid = acc.register_deferred_param(source.to_string());
    let tid = acc.register_deferred_param(target.to_string());

    let target_match = match target {
        ExternalRef::Id(_) => format!("  MATCH ({t}:{INDEXABLE} {{id: ${tid}}})"),
        ExternalRef::Uri(_) => {
            format!("  MATCH (:{URI_NODE} {{uri: ${tid}}})<-[:{URIS_REL}]-({t}:{INDEXABLE})")
        }
    };

    let mut lines = vec![
        "CALL {".to_string(),
        format!("  MATCH ({s}:{INDEXABLE} {{id: ${sid}}})"),
        target_match,
        format!("  WITH {s}, {t} LIMIT 1"),
    ];
    lines.extend(derived_creates(
        acc,
        field,
        primary,
        head_id,
        s.as_str(),
        t.as_str(),
        false,
    ));
    lines.push("}".to_string());

    tracing::debug!(field = %field.name, %source, %target, "Deferred derived edges");
    acc.append_deferred_call(lines.join("\n"));
    Ok(())
}

/// Defer shortcut edges from `source` past the reified node `reified` to
/// every final target reachable through `chain_relations`.
pub fn append_shortcut_edges(
    acc: &mut QueryAccumulator,
    field: &FieldDescriptor,
    source: ExternalId,
    reified: ExternalId,
    chain_relations: &[String],
    primary: &Map<String, Value>,
) -> Result<(), GraphError> {
    let head_id = head_of(acc)?;
    let s = acc.next_identifier();
    let r = acc.next_identifier();
    let t = acc.next_identifier();
    let chain = acc.next_identifier();
    let sid = acc.register_deferred_param(source.to_string());
    let rid = acc.register_deferred_param(reified.to_string());

    let mut lines = vec![
        "CALL {".to_string(),
        format!(
            "  MATCH ({s}:{INDEXABLE} {{id: ${sid}}})-[:{} {{{PRIMARY_REL}: true}}]->({r}:{REIFIED_RELATION} {{id: ${rid}}})",
            field.relation_type()
        ),
        format!(
            "  MATCH {chain} = ({r})-[:{}*1..]->({t}:BaseNode)",
            chain_relations.join("|")
        ),
        format!("  WHERE NOT {t}:{REIFIED_RELATION}"),
        format!("    AND all(step IN relationships({chain}) WHERE step.{PRIMARY_REL} = true)"),
        format!("    AND all(hop IN nodes({chain})[1..-1] WHERE hop:{REIFIED_RELATION})"),
        format!("  WITH DISTINCT {s}, {t}"),
    ];
    lines.extend(derived_creates(
        acc,
        field,
        primary,
        head_id,
        s.as_str(),
        t.as_str(),
        true,
    ));
    lines.push("}".to_string());

    tracing::debug!(field = %field.name, %source, %reified, "Deferred shortcut edges");
    acc.append_deferred_call(lines.join("\n"));
    Ok(())
}
