//! Neo4j connection management and shared graph client.

use neo4rs::{ConfigBuilder, Graph, Query};
use tessera_audit::AuditError;
use tessera_core::{GraphConfig, SchemaError, TesseraError};

use crate::labels::{INDEXABLE, USER_NODE};

/// Errors from building or running graph writes.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Node not found: {type_name} with id {id}")]
    NotFound { type_name: String, id: String },

    #[error("Invalid write: {0}")]
    Write(#[from] TesseraError),

    #[error("Query accumulator error: {0}")]
    Accumulator(String),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Deferred pass failed: {0}")]
    DeferredPass(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<SchemaError> for GraphError {
    fn from(err: SchemaError) -> Self {
        Self::Write(TesseraError::Schema(err))
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Every write the engine plans goes through this client.
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a write-only query.
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<neo4rs::Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }

    /// Create the uniqueness constraints and the `head_id` index the engine relies on, and the
    /// system user audit records fall back to.
    pub async fn bootstrap(&self, default_user: &str) -> Result<(), GraphError> {
        for statement in bootstrap_statements() {
            self.run(neo4rs::query(&statement)).await?;
        }

        self.ensure_user(default_user).await?;

        tracing::info!(%default_user, "Bootstrapped constraints and system user");
        Ok(())
    }

    /// Ensure an acting user exists before a write names it.
    pub async fn ensure_user(&self, username: &str) -> Result<(), GraphError> {
        let q = neo4rs::query(&format!("MERGE (u:{USER_NODE} {{username: $username}})"))
            .param("username", username);
        self.run(q).await
    }
}

/// Constraints and indexes on every label the engine matches by property.
pub(crate) fn bootstrap_statements() -> [String; 4] {
    [
        format!(
            "CREATE CONSTRAINT tessera_node_id IF NOT EXISTS FOR (n:{INDEXABLE}) REQUIRE n.id IS UNIQUE"
        ),
        "CREATE CONSTRAINT tessera_uri IF NOT EXISTS FOR (u:PGUri) REQUIRE u.uri IS UNIQUE"
            .to_string(),
        "CREATE CONSTRAINT tessera_username IF NOT EXISTS FOR (u:PGUser) REQUIRE u.username IS UNIQUE"
            .to_string(),
        format!("CREATE INDEX tessera_head_id IF NOT EXISTS FOR (n:{INDEXABLE}) ON (n.head_id)"),
    ]
}
