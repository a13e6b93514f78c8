//! Audit-record fragments appended to the primary statement.
//!
//! Creation records hang off the created node via `PG_CREATED_IN`,
//! modification records via `PG_MODIFIED_IN`; both link to the acting
//! `PGUser`. The record node stores the serialized patch and its hash.

use serde_json::{Map, Value};
use tessera_audit::{AuditKind, AuditRecord};

use crate::accumulator::QueryAccumulator;
use crate::client::GraphError;
use crate::identifier::Identifier;
use crate::labels::{
    CREATED_BY_REL, CREATED_IN_REL, CREATION_NODE, MODIFICATION_NODE, MODIFIED_BY_REL,
    MODIFIED_IN_REL,
};

/// Stored property holding the patch text, per record kind.
pub fn patch_property(kind: AuditKind) -> &'static str {
    match kind {
        AuditKind::Creation => "creation",
        AuditKind::Modification => "modification",
    }
}

fn record_properties(record: &AuditRecord) -> Result<Map<String, Value>, GraphError> {
    let mut props = Map::new();
    props.insert("id".to_string(), Value::String(record.id.to_string()));
    props.insert(
        patch_property(record.kind).to_string(),
        Value::String(record.patch.to_text()?),
    );
    props.insert(
        "patch_hash".to_string(),
        Value::String(record.patch_hash.clone()),
    );
    Ok(props)
}

/// The `CREATE ... SET` text linking `node` to a new record node.
fn record_clause(
    acc: &mut QueryAccumulator,
    node: &Identifier,
    record: &AuditRecord,
    username: &str,
    indent: &str,
) -> Result<String, GraphError> {
    let user = acc.user_identifier(username);
    let props = acc.register_param(record_properties(record)?);
    let rec = acc.next_identifier();
    let (in_rel, labels, by_rel, stamp) = match record.kind {
        AuditKind::Creation => (CREATED_IN_REL, CREATION_NODE, CREATED_BY_REL, "created_when"),
        AuditKind::Modification => (
            MODIFIED_IN_REL,
            MODIFICATION_NODE,
            MODIFIED_BY_REL,
            "modified_when",
        ),
    };
    Ok(format!(
        "{indent}CREATE ({node})-[:{in_rel}]->({rec}:{labels} ${props})-[:{by_rel}]->({user})\n{indent}SET {rec}.{stamp} = datetime()"
    ))
}

/// Record the creation of `node`, whose assembled view is `view`.
pub fn append_creation_record(
    acc: &mut QueryAccumulator,
    node: &Identifier,
    view: &Value,
    username: &str,
) -> Result<AuditRecord, GraphError> {
    let record = AuditRecord::creation(view, username)?;
    let clause = record_clause(acc, node, &record, username, "")?;
    acc.append_create(clause);
    Ok(record)
}

/// Record a modification of `node`.
pub fn append_modification_record(
    acc: &mut QueryAccumulator,
    node: &Identifier,
    record: &AuditRecord,
    username: &str,
) -> Result<(), GraphError> {
    let clause = record_clause(acc, node, record, username, "")?;
    acc.append_create(clause);
    Ok(())
}

/// Record a creation only if the preceding MERGE created `node`.
///
/// The MERGE stamps `_pg_creation_id` with the record id on create; the
/// record (and any `extra` clauses) are written only when it matches.
pub fn append_conditional_creation(
    acc: &mut QueryAccumulator,
    node: &Identifier,
    record: &AuditRecord,
    marker: &Identifier,
    extra: &[String],
    username: &str,
) -> Result<(), GraphError> {
    let clause = record_clause(acc, node, record, username, "  ")?;
    let mut lines = vec![format!(
        "FOREACH (_ IN CASE WHEN {node}.{} = ${marker} THEN [1] ELSE [] END |",
        crate::labels::CREATION_MARKER
    )];
    lines.extend(extra.iter().cloned());
    lines.push(clause);
    lines.push(")".to_string());
    acc.append_create(lines.join("\n"));
    Ok(())
}
