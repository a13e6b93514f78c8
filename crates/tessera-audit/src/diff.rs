//! Structural diffs between entity views.
//!
//! A [`Patch`] is an ordered list of JSON-Pointer operations in the shape
//! of RFC 6902 (`add`, `remove`, `replace`). Applying `diff(a, b)` to `a`
//! yields `b`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AuditError;

///
/// PatchOp
///
/// One positional edit. Paths are JSON Pointers into the document state
/// at the time the operation executes, so array removals are emitted from
/// the highest index down.
///

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
        }
    }
}

///
/// Patch
///
/// Operations applied in order. An empty patch means "no change".
///

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(pub Vec<PatchOp>);

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    /// Serialized form stored on audit records.
    pub fn to_text(&self) -> Result<String, AuditError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_text(text: &str) -> Result<Self, AuditError> {
        Ok(Self(serde_json::from_str(text)?))
    }

    /// Apply every operation to `doc` in order.
    pub fn apply_to(&self, doc: &mut Value) -> Result<(), AuditError> {
        for op in &self.0 {
            apply_op(doc, op)?;
        }
        Ok(())
    }
}

// ── Diff ─────────────────────────────────────────────────────────

/// Operations that turn `from` into `to`.
pub fn diff(from: &Value, to: &Value) -> Patch {
    let mut ops = Vec::new();
    diff_into(from, to, "", &mut ops);
    Patch(ops)
}

/// The patch recorded when an entity is created: its whole view, added to `{}`.
pub fn diff_for_creation(view: &Value) -> Patch {
    diff(&Value::Object(Map::new()), view)
}

/// The patch recorded for an update, or `None` when nothing changed.
pub fn diff_for_update(previous: &Value, current: &Value) -> Option<Patch> {
    let patch = diff(previous, current);
    (!patch.is_empty()).then_some(patch)
}

fn diff_into(from: &Value, to: &Value, path: &str, ops: &mut Vec<PatchOp>) {
    match (from, to) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old) in a {
                let child = child_path(path, key);
                match b.get(key) {
                    Some(new) => diff_into(old, new, &child, ops),
                    None => ops.push(PatchOp::Remove { path: child }),
                }
            }
            for (key, new) in b {
                if !a.contains_key(key) {
                    ops.push(PatchOp::Add {
                        path: child_path(path, key),
                        value: new.clone(),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let common = a.len().min(b.len());
            for i in 0..common {
                diff_into(&a[i], &b[i], &format!("{path}/{i}"), ops);
            }
            for (i, value) in b.iter().enumerate().skip(common) {
                ops.push(PatchOp::Add {
                    path: format!("{path}/{i}"),
                    value: value.clone(),
                });
            }
            for i in (common..a.len()).rev() {
                ops.push(PatchOp::Remove {
                    path: format!("{path}/{i}"),
                });
            }
        }
        _ if from == to => {}
        _ => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: to.clone(),
        }),
    }
}

fn child_path(parent: &str, key: &str) -> String {
    format!("{parent}/{}", key.replace('~', "~0").replace('/', "~1"))
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

// ── Apply ────────────────────────────────────────────────────────

fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<(), AuditError> {
    match op {
        PatchOp::Add { path, value } => {
            if path.is_empty() {
                *doc = value.clone();
                return Ok(());
            }
            let (parent, token) = split_parent(path)?;
            match parent_mut(doc, parent, path)? {
                Value::Object(map) => {
                    map.insert(token, value.clone());
                }
                Value::Array(items) => {
                    let index = if token == "-" {
                        items.len()
                    } else {
                        parse_index(&token, path)?
                    };
                    if index > items.len() {
                        return Err(AuditError::PathNotFound(path.clone()));
                    }
                    items.insert(index, value.clone());
                }
                _ => return Err(AuditError::InvalidPath(path.clone())),
            }
        }
        PatchOp::Remove { path } => {
            let (parent, token) = split_parent(path)?;
            match parent_mut(doc, parent, path)? {
                Value::Object(map) => {
                    map.remove(&token)
                        .ok_or_else(|| AuditError::PathNotFound(path.clone()))?;
                }
                Value::Array(items) => {
                    let index = parse_index(&token, path)?;
                    if index >= items.len() {
                        return Err(AuditError::PathNotFound(path.clone()));
                    }
                    items.remove(index);
                }
                _ => return Err(AuditError::InvalidPath(path.clone())),
            }
        }
        PatchOp::Replace { path, value } => {
            let target = doc
                .pointer_mut(path)
                .ok_or_else(|| AuditError::PathNotFound(path.clone()))?;
            *target = value.clone();
        }
    }
    Ok(())
}

fn split_parent(path: &str) -> Result<(&str, String), AuditError> {
    let cut = path
        .rfind('/')
        .ok_or_else(|| AuditError::InvalidPath(path.to_string()))?;
    Ok((&path[..cut], unescape(&path[cut + 1..])))
}

fn parent_mut<'v>(doc: &'v mut Value, parent: &str, path: &str) -> Result<&'v mut Value, AuditError> {
    doc.pointer_mut(parent)
        .ok_or_else(|| AuditError::PathNotFound(path.to_string()))
}

fn parse_index(token: &str, path: &str) -> Result<usize, AuditError> {
    token
        .parse()
        .map_err(|_| AuditError::InvalidPath(path.to_string()))
}
