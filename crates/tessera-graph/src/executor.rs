//! Running write plans against Neo4j.
//!
//! One write is one transaction: the previous view is read (updates only),
//! the primary statement runs, then the deferred statement. Any failure
//! rolls the whole write back.

use std::time::Instant;

use neo4rs::Txn;
use serde_json::Value;
use tessera_audit::replay;
use tessera_core::{Entity, ExternalId, SchemaRegistry, TesseraError, WriteSettings};

use crate::accumulator::WritePlan;
use crate::client::{GraphClient, GraphError};
use crate::engine::WriteEngine;
use crate::history::load_history_in;
use crate::labels::{HEAD_NODE, INDEXABLE, USER_NODE, WRITE_LOCK};

/// The result of one executed write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub head_id: ExternalId,
    pub head_type: String,
    /// Stored properties of the head node, or its previous view for a no-op.
    pub head: Value,
    pub changed: bool,
    pub deferred_applied: bool,
}

pub struct WriteExecutor<'a> {
    client: &'a GraphClient,
    schema: &'a SchemaRegistry,
    settings: &'a WriteSettings,
}

impl<'a> WriteExecutor<'a> {
    pub fn new(
        client: &'a GraphClient,
        schema: &'a SchemaRegistry,
        settings: &'a WriteSettings,
    ) -> Self {
        Self {
            client,
            schema,
            settings,
        }
    }

    fn engine(&self) -> WriteEngine<'a> {
        WriteEngine::new(self.schema, self.settings)
    }

    /// Create a new head entity.
    pub async fn create(
        &self,
        entity: &Entity,
        username: Option<&str>,
    ) -> Result<WriteOutcome, GraphError> {
        let plan = self.engine().plan_create(entity, username)?;
        let username = username.unwrap_or(&self.settings.default_user);

        let mut txn = self.client.start_txn().await?;
        let result = self.apply_plan(&mut txn, &plan, username).await;
        finish(txn, result).await
    }

    /// Update an existing head entity against its persisted history.
    pub async fn update(
        &self,
        entity: &Entity,
        username: Option<&str>,
    ) -> Result<WriteOutcome, GraphError> {
        let id = entity.external_id().ok_or_else(|| {
            TesseraError::invalid_entity(&entity.type_name, "existing entity without an id")
        })?;

        let mut txn = self.client.start_txn().await?;
        let result = self.update_in(&mut txn, entity, id, username).await;
        finish(txn, result).await
    }

    async fn update_in(
        &self,
        txn: &mut Txn,
        entity: &Entity,
        id: ExternalId,
        username: Option<&str>,
    ) -> Result<WriteOutcome, GraphError> {
        // Concurrent updates of one head queue here, so each reads the
        // history the previous one committed.
        if !lock_head(txn, id).await? {
            return Err(GraphError::NotFound {
                type_name: entity.type_name.clone(),
                id: id.to_string(),
            });
        }
        let records = load_history_in(txn, id).await?;
        if records.is_empty() {
            return Err(GraphError::NotFound {
                type_name: entity.type_name.clone(),
                id: id.to_string(),
            });
        }
        let previous = replay(&records)?;

        match self.engine().plan_update(entity, &previous, username)? {
            None => {
                tracing::info!(type_name = %entity.type_name, %id, "Skipping no-op update");
                Ok(WriteOutcome {
                    head_id: id,
                    head_type: entity.type_name.clone(),
                    head: previous,
                    changed: false,
                    deferred_applied: false,
                })
            }
            Some(plan) => {
                let username = username.unwrap_or(&self.settings.default_user);
                self.apply_plan(txn, &plan, username).await
            }
        }
    }

    /// Run the primary statement, then the deferred one if enabled.
    async fn apply_plan(
        &self,
        txn: &mut Txn,
        plan: &WritePlan,
        username: &str,
    ) -> Result<WriteOutcome, GraphError> {
        let user = neo4rs::query(&format!("MERGE (u:{USER_NODE} {{username: $username}})"))
            .param("username", username);
        txn.run(user).await?;

        let started = Instant::now();
        let mut stream = txn.execute(plan.primary.to_query()).await?;
        let Some(row) = stream.next(txn.handle()).await? else {
            return Err(GraphError::NotFound {
                type_name: plan.head_type.clone(),
                id: plan.head_id.to_string(),
            });
        };
        // Drain so the deferred statement sees every primary write.
        while stream.next(txn.handle()).await?.is_some() {}
        let head: Value = row
            .get("head")
            .map_err(|e| GraphError::Serialization(format!("head projection: {e}")))?;
        tracing::info!(
            head_id = %plan.head_id,
            head_type = %plan.head_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Primary pass complete"
        );

        let mut deferred_applied = false;
        if let Some(deferred) = plan.deferred.as_ref().filter(|_| self.settings.run_deferred) {
            let started = Instant::now();
            if let Err(e) = txn.run(deferred.to_query()).await {
                tracing::error!(
                    head_id = %plan.head_id,
                    error = %e,
                    "Deferred pass failed, rolling back"
                );
                return Err(GraphError::DeferredPass(e.to_string()));
            }
            deferred_applied = true;
            tracing::info!(
                head_id = %plan.head_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Deferred pass complete"
            );
        }

        Ok(WriteOutcome {
            head_id: plan.head_id,
            head_type: plan.head_type.clone(),
            head,
            changed: true,
            deferred_applied,
        })
    }
}

/// Statement that takes the write lock of a head node, held until the
/// transaction ends.
pub(crate) fn lock_statement() -> String {
    format!(
        "MATCH (n:{INDEXABLE}:{HEAD_NODE} {{id: $id}})\nSET n.{WRITE_LOCK} = true\nREMOVE n.{WRITE_LOCK}\nRETURN n.id AS id"
    )
}

/// Lock the head `id`. Returns `false` when no such head exists.
async fn lock_head(txn: &mut Txn, id: ExternalId) -> Result<bool, GraphError> {
    let q = neo4rs::query(&lock_statement()).param("id", id.to_string());
    let mut stream = txn.execute(q).await?;
    let mut locked = false;
    while stream.next(txn.handle()).await?.is_some() {
        locked = true;
    }
    tracing::debug!(%id, locked, "Head lock");
    Ok(locked)
}

/// Commit on success, roll back on failure.
async fn finish(
    txn: Txn,
    result: Result<WriteOutcome, GraphError>,
) -> Result<WriteOutcome, GraphError> {
    match result {
        Ok(outcome) if outcome.changed => {
            txn.commit().await?;
            Ok(outcome)
        }
        Ok(outcome) => {
            txn.rollback().await?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
