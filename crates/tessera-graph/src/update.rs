//! Fragments that bring a persisted entity tree in line with an edited one.
//!
//! Reconciliation is by membership, not position: for each relation field
//! the ids (and URIs) the edited entity still names are kept, everything
//! else attached through that field is detached, and owned children that
//! fell out of the field are deleted along with their exclusively owned
//! descendants.

use std::collections::BTreeMap;

use serde_json::Value;
use tessera_audit::{diff_for_update, AuditRecord};
use tessera_core::{
    Entity, EntityKind, ExternalId, ExternalRef, FieldDescriptor, SchemaRegistry, TesseraError,
    TypeDescriptor, WriteSettings,
};

use crate::accumulator::QueryAccumulator;
use crate::audit::append_modification_record;
use crate::child::{classify, ChildWrite};
use crate::client::GraphError;
use crate::create::{
    append_uris, check_fields, insert_system_properties, write_edge, CreateEmitter, EdgeWrite,
};
use crate::edges::{append_derived_edges, primary_edge_properties, Ownership};
use crate::identifier::Identifier;
use crate::labels::{
    label_string, NodeRole, CASCADE, DETACH_DELETE, HEAD_NODE, INDEXABLE, PRIMARY_REL, URIS_REL,
    URI_NODE,
};
use crate::properties::{serialize_properties, Absent};
use crate::spaces::SemanticSpaces;
use crate::view::{entity_view, node_view};

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub identifier: Identifier,
    /// `false` when the edited entity matches its previous view.
    pub changed: bool,
    /// The entity's view after the update.
    pub view: Value,
}

/// Ids and URIs still attached through one field after the update.
#[derive(Debug, Default)]
struct Retained {
    ids: Vec<String>,
    uris: Vec<String>,
}

impl Retained {
    fn keep(&mut self, reference: &ExternalRef) {
        match reference {
            ExternalRef::Id(id) => self.ids.push(id.to_string()),
            ExternalRef::Uri(uri) => self.uris.push(uri.clone()),
        }
    }
}

pub struct UpdateReconciler<'a> {
    emitter: CreateEmitter<'a>,
    previous: &'a Value,
}

impl<'a> UpdateReconciler<'a> {
    /// `previous` is the head's last persisted view.
    pub fn new(
        schema: &'a SchemaRegistry,
        settings: &'a WriteSettings,
        username: &'a str,
        previous: &'a Value,
    ) -> Self {
        Self {
            emitter: CreateEmitter::new(schema, settings, username),
            previous,
        }
    }

    /// Reconcile the head entity.
    ///
    /// A no-op update sets the head and returns `changed: false` without
    /// appending any fragment.
    pub fn emit_update(
        &self,
        entity: &Entity,
        acc: &mut QueryAccumulator,
    ) -> Result<UpdateOutcome, GraphError> {
        let id = existing_id(entity)?;
        let schema = self.emitter.schema();
        let descriptor = schema.get(&entity.type_name)?;
        check_fields(entity, descriptor)?;

        let h = acc.next_identifier();
        acc.set_head(id, &entity.type_name, h.clone());

        let requested = entity_view(entity)?;
        if diff_for_update(self.previous, &requested).is_none() {
            tracing::debug!(type_name = %entity.type_name, %id, "Update is a no-op");
            return Ok(UpdateOutcome {
                identifier: h,
                changed: false,
                view: self.previous.clone(),
            });
        }

        let pid = acc.register_param(id.to_string());
        acc.append_match(format!("MATCH ({h}:{INDEXABLE}:{HEAD_NODE} {{id: ${pid}}})"));
        let root = SemanticSpaces::root();
        self.set_properties(entity, descriptor, id, NodeRole::Head, &h, &root, acc)?;

        // Derived edges of this head are regenerated by the deferred pass.
        append_derived_reset(acc, &h, id);

        let mut uris = entity.uris.clone();
        uris.push(
            self.emitter
                .settings()
                .canonical_uri(&entity.type_name, &id),
        );
        append_uris(acc, &h, &uris);
        append_uri_reset(acc, &h, &uris);

        let relation_views =
            self.reconcile_fields(entity, descriptor, &h, id, &root.enter(descriptor), acc)?;
        let view = node_view(entity, Some(&ExternalRef::Id(id)), relation_views)?;

        if let Some(record) =
            AuditRecord::modification(self.previous, &view, self.emitter.username())?
        {
            append_modification_record(acc, &h, &record, self.emitter.username())?;
        }

        tracing::debug!(
            type_name = %entity.type_name,
            %id,
            fragments = acc.primary_fragment_count(),
            deferred = acc.deferred_fragment_count(),
            "Update reconciled"
        );
        Ok(UpdateOutcome {
            identifier: h,
            changed: true,
            view,
        })
    }

    /// Merge an existing owned child by id, refresh its properties, and
    /// reconcile its own fields.
    fn edit_node(
        &self,
        entity: &Entity,
        acc: &mut QueryAccumulator,
        role: NodeRole,
        spaces: &SemanticSpaces,
    ) -> Result<(Identifier, ExternalId, Value), GraphError> {
        let id = existing_id(entity)?;
        let descriptor = self.emitter.schema().get(&entity.type_name)?;
        check_fields(entity, descriptor)?;

        let c = acc.next_identifier();
        let pid = acc.register_param(id.to_string());
        acc.append_create(format!("MERGE ({c}:{INDEXABLE} {{id: ${pid}}})"));
        self.set_properties(entity, descriptor, id, role, &c, spaces, acc)?;
        append_uris(acc, &c, &entity.uris);
        append_uri_reset(acc, &c, &entity.uris);

        let relation_views =
            self.reconcile_fields(entity, descriptor, &c, id, &spaces.enter(descriptor), acc)?;
        let view = node_view(entity, Some(&ExternalRef::Id(id)), relation_views)?;
        Ok((c, id, view))
    }

    /// Overwrite declared and system properties; unset ones become null.
    #[allow(clippy::too_many_arguments)]
    fn set_properties(
        &self,
        entity: &Entity,
        descriptor: &TypeDescriptor,
        id: ExternalId,
        role: NodeRole,
        node: &Identifier,
        spaces: &SemanticSpaces,
        acc: &mut QueryAccumulator,
    ) -> Result<(), GraphError> {
        let mut props = serialize_properties(
            &entity.type_name,
            &descriptor.properties,
            &entity.properties,
            Absent::Null,
        )?;
        insert_system_properties(&mut props, entity, id, role, acc, Absent::Null);
        spaces.insert_into(&mut props);
        let p = acc.register_param(props);
        if role.is_head() {
            acc.append_set(format!("SET {node} += ${p}"));
        } else {
            acc.append_create(format!(
                "SET {node} += ${p}, {node}{}",
                label_string(descriptor, role)
            ));
        }
        Ok(())
    }

    /// Reconcile every field of `entity`, whose children live in `spaces`.
    fn reconcile_fields(
        &self,
        entity: &Entity,
        descriptor: &TypeDescriptor,
        node: &Identifier,
        id: ExternalId,
        spaces: &SemanticSpaces,
        acc: &mut QueryAccumulator,
    ) -> Result<BTreeMap<String, Vec<Value>>, GraphError> {
        let mut relation_views = BTreeMap::new();
        for field in &descriptor.fields {
            // A field the entity leaves out is emptied.
            let children = entity
                .relations
                .get(&field.name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let views = self.reconcile_field(descriptor, field, children, node, id, spaces, acc)?;
            relation_views.insert(field.name.clone(), views);
        }
        Ok(relation_views)
    }

    /// Write every child of one field, then detach whatever it no longer names.
    #[allow(clippy::too_many_arguments)]
    fn reconcile_field(
        &self,
        source: &TypeDescriptor,
        field: &FieldDescriptor,
        children: &[Entity],
        node: &Identifier,
        source_id: ExternalId,
        spaces: &SemanticSpaces,
        acc: &mut QueryAccumulator,
    ) -> Result<Vec<Value>, GraphError> {
        let mut retained = Retained::default();
        let mut views = Vec::with_capacity(children.len());

        for child in children {
            let child_type = self.emitter.schema().get(&child.type_name)?;
            let write = classify(field, child, child_type)?;
            if !write.is_edit() {
                let emitted = self.emitter.emit_child(
                    source,
                    field,
                    child,
                    node,
                    source_id,
                    acc,
                    EdgeWrite::Merge,
                    spaces,
                )?;
                retained.keep(&emitted.external_id);
                views.push(emitted.view);
                continue;
            }

            let (role, ownership) = match write {
                ChildWrite::EditEmbedded => (NodeRole::Embedded, Ownership::Embedded),
                ChildWrite::EditReified => (NodeRole::Reified, Ownership::Owned),
                ChildWrite::EditSemanticSpace => (NodeRole::SemanticSpace, Ownership::Owned),
                _ => (
                    NodeRole::Inline {
                        edit_inline: field.edit_inline,
                    },
                    Ownership::Owned,
                ),
            };
            let (c, child_id, view) = self.edit_node(child, acc, role, spaces)?;
            let target = ExternalRef::Id(child_id);
            let props = primary_edge_properties(field, child, ownership, spaces)?;
            match write {
                ChildWrite::EditInline | ChildWrite::EditSemanticSpace => {
                    append_derived_edges(acc, field, source_id, &target, &props)?;
                }
                ChildWrite::EditReified if !source.reified => {
                    self.emitter
                        .append_shortcut(acc, field, source_id, child, &target, &props)?;
                }
                _ => {}
            }
            write_edge(acc, EdgeWrite::Merge, node, field, &c, props);
            retained.keep(&target);
            views.push(view);
        }

        append_cleanup(acc, node, field, retained);
        Ok(views)
    }
}

fn existing_id(entity: &Entity) -> Result<ExternalId, TesseraError> {
    if entity.kind != EntityKind::Existing {
        return Err(TesseraError::invalid_entity(
            &entity.type_name,
            format!("cannot update an entity of kind {:?}", entity.kind),
        ));
    }
    entity
        .external_id()
        .ok_or_else(|| TesseraError::invalid_entity(&entity.type_name, "existing entity without an id"))
}

/// Detach the URIs of `node` that the edited entity no longer lists.
fn append_uri_reset(acc: &mut QueryAccumulator, node: &Identifier, keep: &[String]) {
    let keep = acc.register_param(Value::from(keep.to_vec()));
    let link = acc.next_identifier();
    let uri = acc.next_identifier();
    acc.append_delete(format!(
        "CALL {{
  WITH {node}
  MATCH ({node})-[{link}:{URIS_REL}]->({uri}:{URI_NODE})
  WHERE NOT {uri}.uri IN ${keep}
  DELETE {link}
}}"
    ));
}

/// Delete every derived edge written on behalf of the head `h`.
///
/// Each derived edge touches the head or a node it owns, so the search
/// starts from those nodes (indexed by `head_id`) instead of scanning all
/// relationships.
fn append_derived_reset(acc: &mut QueryAccumulator, h: &Identifier, id: ExternalId) {
    let hid = acc.register_param(id.to_string());
    let member = acc.next_identifier();
    let derived = acc.next_identifier();
    acc.append_delete(format!(
        "CALL {{
  WITH {h}
  OPTIONAL MATCH ({member}:{INDEXABLE} {{head_id: ${hid}}})
  WITH {h}, collect({member}) AS members
  UNWIND [{h}] + members AS anchor
  MATCH (anchor)-[{derived}]-()
  WHERE {derived}.head_id = ${hid} AND {derived}.{PRIMARY_REL} = false
  WITH DISTINCT {derived}
  DELETE {derived}
}}"
    ));
}

/// One cleanup fragment for `field` of `node`.
///
/// The first subquery deletes owned children that are no longer named,
/// together with every node reachable from them only through owning edges.
/// A path stops at the first node that something else holds through a
/// non-owning primary edge: that node and everything below it survive.
/// The second detaches every primary edge of the field whose target is no
/// longer named, by id or by URI.
fn append_cleanup(acc: &mut QueryAccumulator, node: &Identifier, field: &FieldDescriptor, retained: Retained) {
    let rel_type = field.relation_type();
    let keep = acc.register_param(Value::from(retained.ids));
    let keep_uris = acc.register_param(Value::from(retained.uris));
    let orphan = acc.next_identifier();
    let doomed = acc.next_identifier();
    let stale = acc.next_identifier();
    let target = acc.next_identifier();

    let fragment = format!(
        "CALL {{
  WITH {node}
  OPTIONAL MATCH ({node})-[:{rel_type} {{{PRIMARY_REL}: true}}]->({orphan}:{DETACH_DELETE})
  WHERE NOT {orphan}.id IN ${keep}
    AND NOT exists {{ MATCH ({orphan})-[:{URIS_REL}]->(kept:{URI_NODE}) WHERE kept.uri IN ${keep_uris} }}
  OPTIONAL MATCH owned = ({orphan})-[*0..]->({doomed}:{DETACH_DELETE})
  WHERE all(link IN relationships(owned) WHERE link.{CASCADE} = true)
    AND none(step IN nodes(owned) WHERE exists {{
      MATCH (holder)-[other]->(step)
      WHERE other.{PRIMARY_REL} = true AND coalesce(other.{CASCADE}, false) = false
    }})
  WITH DISTINCT {doomed}
  DETACH DELETE {doomed}
}}
CALL {{
  WITH {node}
  MATCH ({node})-[{stale}:{rel_type}]->({target})
  WHERE {stale}.{PRIMARY_REL} = true
    AND NOT {target}.id IN ${keep}
    AND NOT exists {{ MATCH ({target})-[:{URIS_REL}]->(kept:{URI_NODE}) WHERE kept.uri IN ${keep_uris} }}
  DELETE {stale}
}}"
    );
    acc.append_delete(fragment);
}
