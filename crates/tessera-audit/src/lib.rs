//! Tessera Audit: structural history of entity views.
//!
//! Every write records what changed as a JSON patch against the entity's
//! previous view. Creation records hold the patch from `{}`; modification
//! records hold the patch from the prior view. Replaying the records in
//! timestamp order rebuilds the current view. Each record carries a BLAKE3
//! hash of its serialized patch for tamper evidence.

pub mod diff;
pub mod hash;
pub mod replay;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use diff::{diff, diff_for_creation, diff_for_update, Patch, PatchOp};
pub use replay::{replay, replay_until};

/// Errors from diffing, applying, or replaying patches.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("patch path not found: {0}")]
    PathNotFound(String),

    #[error("invalid patch path: {0}")]
    InvalidPath(String),

    #[error("history does not start with a creation record")]
    MissingCreation,

    #[error("audit record {0} failed its integrity check")]
    Tampered(AuditId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── Core Types ───────────────────────────────────────────────────

/// Unique identifier for an audit record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AuditId(pub Uuid);

impl AuditId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Creation,
    Modification,
}

/// One entry of a node's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: AuditId,
    pub kind: AuditKind,
    pub recorded_at: DateTime<Utc>,
    pub username: String,
    pub patch: Patch,
    /// BLAKE3 hex digest of the serialized patch.
    pub patch_hash: String,
}

impl AuditRecord {
    /// Record the creation of an entity whose assembled view is `view`.
    pub fn creation(view: &Value, username: &str) -> Result<Self, AuditError> {
        Self::from_patch(AuditKind::Creation, diff_for_creation(view), username)
    }

    /// Record a modification, or `None` when the views are identical.
    pub fn modification(
        previous: &Value,
        current: &Value,
        username: &str,
    ) -> Result<Option<Self>, AuditError> {
        match diff_for_update(previous, current) {
            Some(patch) => Self::from_patch(AuditKind::Modification, patch, username).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_patch(kind: AuditKind, patch: Patch, username: &str) -> Result<Self, AuditError> {
        let patch_hash = hash::compute_patch_hash(&patch.to_text()?);
        Ok(Self {
            id: AuditId::new(),
            kind,
            recorded_at: Utc::now(),
            username: username.to_string(),
            patch,
            patch_hash,
        })
    }

    /// Rebuild a record read back from storage, checking the stored hash
    /// against the stored patch text.
    pub fn from_stored(
        id: AuditId,
        kind: AuditKind,
        recorded_at: DateTime<Utc>,
        username: String,
        patch_text: &str,
        patch_hash: String,
    ) -> Result<Self, AuditError> {
        if hash::compute_patch_hash(patch_text) != patch_hash {
            tracing::warn!(record = %id, "Audit record hash mismatch");
            return Err(AuditError::Tampered(id));
        }
        Ok(Self {
            id,
            kind,
            recorded_at,
            username,
            patch: Patch::from_text(patch_text)?,
            patch_hash,
        })
    }

    pub fn verify(&self) -> bool {
        hash::verify_record(self)
    }
}
