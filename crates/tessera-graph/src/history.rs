//! Reading a node's audit records back out of the graph.

use chrono::{DateTime, Utc};
use neo4rs::{Query, Row, Txn};
use tessera_audit::{AuditId, AuditKind, AuditRecord};
use tessera_core::ExternalId;
use uuid::Uuid;

use crate::client::{GraphClient, GraphError};
use crate::labels::{
    CREATED_BY_REL, CREATED_IN_REL, INDEXABLE, MODIFIED_BY_REL, MODIFIED_IN_REL,
};

/// Every audit record of the node with `id`, oldest first.
pub fn history_query(id: ExternalId) -> Query {
    let text = format!(
        "MATCH (n:{INDEXABLE} {{id: $id}})-[:{CREATED_IN_REL}|{MODIFIED_IN_REL}]->(rec)
OPTIONAL MATCH (rec)-[:{CREATED_BY_REL}|{MODIFIED_BY_REL}]->(user)
WITH rec, user, coalesce(rec.created_when, rec.modified_when) AS stamp
RETURN rec.id AS id,
       CASE WHEN rec.creation IS NOT NULL THEN 'creation' ELSE 'modification' END AS kind,
       toString(stamp) AS recorded_at,
       coalesce(rec.creation, rec.modification) AS patch,
       rec.patch_hash AS patch_hash,
       coalesce(user.username, '') AS username
ORDER BY stamp, id"
    );
    neo4rs::query(&text).param("id", id.to_string())
}

fn column(row: &Row, name: &str) -> Result<String, GraphError> {
    row.get::<String>(name)
        .map_err(|e| GraphError::Serialization(format!("audit column '{name}': {e}")))
}

/// Rebuild one record from a history row, verifying its hash.
pub fn record_from_row(row: &Row) -> Result<AuditRecord, GraphError> {
    let id = Uuid::parse_str(&column(row, "id")?)
        .map(AuditId)
        .map_err(|e| GraphError::Serialization(format!("audit id: {e}")))?;
    let kind = match column(row, "kind")?.as_str() {
        "creation" => AuditKind::Creation,
        _ => AuditKind::Modification,
    };
    let recorded_at = DateTime::parse_from_rfc3339(&column(row, "recorded_at")?)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GraphError::Serialization(format!("audit timestamp: {e}")))?;

    Ok(AuditRecord::from_stored(
        id,
        kind,
        recorded_at,
        column(row, "username")?,
        &column(row, "patch")?,
        column(row, "patch_hash")?,
    )?)
}

/// Load the history inside an open transaction.
pub async fn load_history_in(txn: &mut Txn, id: ExternalId) -> Result<Vec<AuditRecord>, GraphError> {
    let mut stream = txn.execute(history_query(id)).await?;
    let mut records = Vec::new();
    while let Some(row) = stream.next(txn.handle()).await? {
        records.push(record_from_row(&row)?);
    }
    Ok(records)
}

impl GraphClient {
    /// Load the audit history of a node.
    pub async fn load_history(&self, id: ExternalId) -> Result<Vec<AuditRecord>, GraphError> {
        self.query_rows(history_query(id))
            .await?
            .iter()
            .map(record_from_row)
            .collect()
    }
}
