//! Rebuilding entity views from their audit history.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{AuditError, AuditKind, AuditRecord};

/// Replay every record, oldest first, starting from `{}`.
///
/// Records are ordered by timestamp, then id. The first must be a creation.
pub fn replay(records: &[AuditRecord]) -> Result<Value, AuditError> {
    replay_until(records, None)
}

/// Replay the records recorded at or before `until` (all of them if `None`).
pub fn replay_until(
    records: &[AuditRecord],
    until: Option<DateTime<Utc>>,
) -> Result<Value, AuditError> {
    let mut ordered: Vec<&AuditRecord> = records
        .iter()
        .filter(|r| until.map_or(true, |t| r.recorded_at <= t))
        .collect();
    ordered.sort_by(|a, b| (a.recorded_at, a.id).cmp(&(b.recorded_at, b.id)));

    match ordered.first() {
        Some(first) if first.kind == AuditKind::Creation => {}
        _ => return Err(AuditError::MissingCreation),
    }

    let mut view = Value::Object(Map::new());
    for record in ordered {
        if !record.verify() {
            return Err(AuditError::Tampered(record.id));
        }
        record.patch.apply_to(&mut view)?;
    }
    Ok(view)
}
