//! Tessera Graph: the Cypher write engine and Neo4j client.
//!
//! This crate is the single mutation point for the entity graph. Entity
//! trees are planned into a primary statement (nodes, primary edges,
//! cleanup, audit records) and a deferred statement (derived and shortcut
//! edges), then executed in one transaction.

pub mod accumulator;
pub mod audit;
pub mod bolt;
pub mod child;
pub mod client;
pub mod create;
pub mod edges;
pub mod engine;
pub mod executor;
pub mod history;
pub mod identifier;
pub mod labels;
pub mod properties;
pub mod spaces;
pub mod update;
pub mod view;

pub use accumulator::{CompiledQuery, QueryAccumulator, WritePlan};
pub use client::{GraphClient, GraphError};
pub use create::{CreateEmitter, EdgeWrite, Emitted};
pub use engine::WriteEngine;
pub use executor::{WriteExecutor, WriteOutcome};
pub use identifier::{Identifier, IdentifierAllocator};
pub use update::{UpdateOutcome, UpdateReconciler};
pub use view::entity_view;
