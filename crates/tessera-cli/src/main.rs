//! CLI entry point for planning and applying Tessera graph writes.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

use tessera_audit::replay_until;
use tessera_core::{Entity, EntityKind, ExternalId, SchemaDocument, SchemaRegistry, TesseraConfig};
use tessera_graph::{GraphClient, WriteEngine, WriteExecutor};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Plan and apply entity-graph writes against Neo4j")]
struct Cli {
    /// Config file prefix (default: tessera).
    #[arg(short, long, default_value = "tessera", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the statements a write would run, without connecting.
    Plan {
        /// Schema document (JSON).
        #[arg(long)]
        schema: PathBuf,
        /// Entity tree to write (JSON).
        #[arg(long)]
        entity: PathBuf,
        /// Previous view of the entity; plans an update when given.
        #[arg(long)]
        previous: Option<PathBuf>,
        /// Acting user (otherwise write.default_user).
        #[arg(long)]
        user: Option<String>,
    },
    /// Create or update an entity tree.
    Apply {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        entity: PathBuf,
        #[arg(long)]
        user: Option<String>,
    },
    /// Create constraints and the default user.
    Bootstrap,
    /// Rebuild an entity's view from its audit records.
    History {
        /// External id of the entity.
        #[arg(long)]
        id: ExternalId,
        /// Only replay records up to this RFC 3339 timestamp.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = TesseraConfig::load(&cli.config)?;

    match cli.command {
        Command::Plan {
            schema,
            entity,
            previous,
            user,
        } => {
            let registry = load_schema(&schema)?;
            let entity: Entity = read_json(&entity)?;
            let engine = WriteEngine::new(&registry, &config.write);
            let plan = match previous {
                Some(path) => {
                    let previous: Value = read_json(&path)?;
                    engine.plan_update(&entity, &previous, user.as_deref())?
                }
                None => Some(engine.plan_create(&entity, user.as_deref())?),
            };
            match plan {
                Some(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
                None => println!("{}", json!({ "changed": false })),
            }
        }
        Command::Apply {
            schema,
            entity,
            user,
        } => {
            let registry = load_schema(&schema)?;
            let entity: Entity = read_json(&entity)?;
            let graph = GraphClient::connect(&config.neo4j).await?;
            let executor = WriteExecutor::new(&graph, &registry, &config.write);

            let outcome = match entity.kind {
                EntityKind::New => executor.create(&entity, user.as_deref()).await?,
                EntityKind::Existing => executor.update(&entity, user.as_deref()).await?,
                other => anyhow::bail!("Cannot apply a head entity of kind {other:?}"),
            };
            tracing::info!(
                head_id = %outcome.head_id,
                head_type = %outcome.head_type,
                changed = outcome.changed,
                deferred_applied = outcome.deferred_applied,
                "Write applied"
            );
            println!("{}", serde_json::to_string_pretty(&outcome.head)?);
        }
        Command::Bootstrap => {
            let graph = GraphClient::connect(&config.neo4j).await?;
            graph.bootstrap(&config.write.default_user).await?;
        }
        Command::History { id, at } => {
            let graph = GraphClient::connect(&config.neo4j).await?;
            let records = graph.load_history(id).await?;
            if records.is_empty() {
                anyhow::bail!("No audit records for {id}");
            }
            let view = replay_until(&records, at)?;
            tracing::info!(%id, records = records.len(), "History replayed");
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_schema(path: &Path) -> anyhow::Result<SchemaRegistry> {
    let document: SchemaDocument = read_json(path)?;
    let registry = SchemaRegistry::compile(&document)?;
    tracing::info!(types = registry.types().count(), "Schema compiled");
    Ok(registry)
}
