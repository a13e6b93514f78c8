//! Ordered Cypher fragments and their parameters.
//!
//! Emitters append clauses into categorized lists (match, create, set,
//! merge, delete, call). Serialization always emits the categories in that
//! order, so a clause that introduces a variable is placed in an earlier
//! category than any clause that uses it. Two independent fragment sets
//! are kept: the primary statement and a deferred one that runs after it.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tessera_core::ExternalId;

use crate::client::GraphError;
use crate::identifier::{Identifier, IdentifierAllocator};

/// Statement text plus its parameter table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub text: String,
    pub params: BTreeMap<String, Value>,
}

impl CompiledQuery {
    /// Convert into a neo4rs query with every parameter bound.
    pub fn to_query(&self) -> neo4rs::Query {
        self.params
            .iter()
            .fold(neo4rs::query(&self.text), |q, (name, value)| {
                q.param(name, crate::bolt::to_bolt(value))
            })
    }
}

/// The statements for one logical write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WritePlan {
    pub head_id: ExternalId,
    pub head_type: String,
    pub primary: CompiledQuery,
    /// `None` when no derived edges were requested.
    pub deferred: Option<CompiledQuery>,
}

#[derive(Debug, Default)]
struct FragmentSet {
    matches: Vec<String>,
    creates: Vec<String>,
    sets: Vec<String>,
    merges: Vec<String>,
    deletes: Vec<String>,
    calls: Vec<String>,
    params: BTreeMap<String, Value>,
}

impl FragmentSet {
    fn fragment_count(&self) -> usize {
        self.matches.len()
            + self.creates.len()
            + self.sets.len()
            + self.merges.len()
            + self.deletes.len()
            + self.calls.len()
    }

    fn render(&self, tail: &str) -> CompiledQuery {
        let mut lines: Vec<&str> = Vec::new();
        for section in [&self.matches, &self.creates, &self.sets, &self.merges] {
            lines.extend(section.iter().map(String::as_str));
        }
        // Subqueries following write clauses need the bindings carried over.
        let has_tail_section = !self.deletes.is_empty() || !self.calls.is_empty();
        if has_tail_section && !lines.is_empty() {
            lines.push("WITH *");
        }
        for section in [&self.deletes, &self.calls] {
            lines.extend(section.iter().map(String::as_str));
        }
        lines.push(tail);

        CompiledQuery {
            text: lines.join("\n"),
            params: self.params.clone(),
        }
    }

    /// Every `$name` in `fragment` must already be a registered parameter.
    fn params_registered(&self, fragment: &str) -> bool {
        referenced_params(fragment).all(|name| self.params.contains_key(name))
    }
}

fn referenced_params(fragment: &str) -> impl Iterator<Item = &str> {
    fragment.match_indices('$').filter_map(move |(at, _)| {
        let rest = &fragment[at + 1..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Match,
    Create,
    Set,
    Merge,
    Delete,
    Call,
}

/// Per-write state: identifiers, both fragment sets, and the head.
#[derive(Debug, Default)]
pub struct QueryAccumulator {
    allocator: IdentifierAllocator,
    primary: FragmentSet,
    deferred: FragmentSet,
    head_id: Option<ExternalId>,
    head_type: Option<String>,
    return_identifier: Option<Identifier>,
    user_identifier: Option<Identifier>,
}

impl QueryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_identifier(&mut self) -> Identifier {
        self.allocator.next_identifier()
    }

    /// Bind `value` under a fresh name in the primary parameter table.
    pub fn register_param(&mut self, value: impl Into<Value>) -> Identifier {
        let name = self.next_identifier();
        self.primary.params.insert(name.to_string(), value.into());
        name
    }

    /// Bind `value` under a fresh name in the deferred parameter table.
    pub fn register_deferred_param(&mut self, value: impl Into<Value>) -> Identifier {
        let name = self.next_identifier();
        self.deferred.params.insert(name.to_string(), value.into());
        name
    }

    fn push(&mut self, deferred: bool, section: Section, fragment: String) {
        let set = if deferred {
            &mut self.deferred
        } else {
            &mut self.primary
        };
        debug_assert!(
            set.params_registered(&fragment),
            "fragment references an unregistered parameter: {fragment}"
        );
        let list = match section {
            Section::Match => &mut set.matches,
            Section::Create => &mut set.creates,
            Section::Set => &mut set.sets,
            Section::Merge => &mut set.merges,
            Section::Delete => &mut set.deletes,
            Section::Call => &mut set.calls,
        };
        list.push(fragment);
    }

    pub fn append_match(&mut self, fragment: impl Into<String>) {
        self.push(false, Section::Match, fragment.into());
    }

    pub fn append_create(&mut self, fragment: impl Into<String>) {
        self.push(false, Section::Create, fragment.into());
    }

    pub fn append_set(&mut self, fragment: impl Into<String>) {
        self.push(false, Section::Set, fragment.into());
    }

    pub fn append_merge(&mut self, fragment: impl Into<String>) {
        self.push(false, Section::Merge, fragment.into());
    }

    pub fn append_delete(&mut self, fragment: impl Into<String>) {
        self.push(false, Section::Delete, fragment.into());
    }

    pub fn append_call(&mut self, fragment: impl Into<String>) {
        self.push(false, Section::Call, fragment.into());
    }

    pub fn append_deferred_match(&mut self, fragment: impl Into<String>) {
        self.push(true, Section::Match, fragment.into());
    }

    pub fn append_deferred_create(&mut self, fragment: impl Into<String>) {
        self.push(true, Section::Create, fragment.into());
    }

    pub fn append_deferred_merge(&mut self, fragment: impl Into<String>) {
        self.push(true, Section::Merge, fragment.into());
    }

    pub fn append_deferred_call(&mut self, fragment: impl Into<String>) {
        self.push(true, Section::Call, fragment.into());
    }

    /// Record the head entity and the variable the primary statement returns.
    pub fn set_head(&mut self, id: ExternalId, type_name: &str, identifier: Identifier) {
        self.head_id = Some(id);
        self.head_type = Some(type_name.to_string());
        self.return_identifier = Some(identifier);
    }

    pub fn head_id(&self) -> Option<ExternalId> {
        self.head_id
    }

    pub fn head_type(&self) -> Option<&str> {
        self.head_type.as_deref()
    }

    pub fn return_identifier(&self) -> Option<&Identifier> {
        self.return_identifier.as_ref()
    }

    /// The variable bound to the acting user, matching it on first use.
    pub fn user_identifier(&mut self, username: &str) -> Identifier {
        if let Some(existing) = &self.user_identifier {
            return existing.clone();
        }
        let user = self.next_identifier();
        let name = self.register_param(username);
        self.append_match(format!("MATCH ({user}:PGUser {{username: ${name}}})"));
        self.user_identifier = Some(user.clone());
        user
    }

    pub fn primary_fragment_count(&self) -> usize {
        self.primary.fragment_count()
    }

    pub fn deferred_fragment_count(&self) -> usize {
        self.deferred.fragment_count()
    }

    /// The primary statement, returning the head node's properties as `head`.
    pub fn to_primary_query(&self) -> Result<CompiledQuery, GraphError> {
        let ret = self.return_identifier.as_ref().ok_or_else(|| {
            GraphError::Accumulator("primary statement has no return identifier".to_string())
        })?;
        Ok(self.primary.render(&format!("RETURN {ret}{{.*}} AS head")))
    }

    /// The deferred statement, or `None` if nothing was deferred.
    pub fn to_deferred_query(&self) -> Option<CompiledQuery> {
        if self.deferred.fragment_count() == 0 {
            return None;
        }
        Some(self.deferred.render("RETURN true AS deferred"))
    }

    /// Serialize both statements. Consumes the accumulator.
    pub fn finish(self) -> Result<WritePlan, GraphError> {
        let primary = self.to_primary_query()?;
        let deferred = self.to_deferred_query();
        let (Some(head_id), Some(head_type)) = (self.head_id, self.head_type) else {
            return Err(GraphError::Accumulator(
                "write plan has no head entity".to_string(),
            ));
        };
        Ok(WritePlan {
            head_id,
            head_type,
            primary,
            deferred,
        })
    }
}
