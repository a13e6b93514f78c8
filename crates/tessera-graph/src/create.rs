//! Fragments that create a new entity tree.
//!
//! The emitter walks the tree depth-first. Each node becomes one `CREATE`
//! with its labels and flattened properties; each child becomes a primary
//! edge, plus deferred derived edges where the relation calls for them.
//! The head's creation record is appended last, from the assembled view
//! with every minted id in place.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tessera_core::{
    Entity, EntityKind, ExternalId, ExternalRef, FieldDescriptor, SchemaRegistry, TesseraError,
    TypeDescriptor, WriteSettings,
};
use tessera_audit::AuditRecord;

use crate::accumulator::QueryAccumulator;
use crate::audit::{append_conditional_creation, append_creation_record};
use crate::child::{classify, ChildWrite};
use crate::client::GraphError;
use crate::edges::{append_derived_edges, append_shortcut_edges, primary_edge_properties, Ownership};
use crate::identifier::Identifier;
use crate::labels::{label_string, NodeRole, CREATION_MARKER, INDEXABLE, PRIMARY_REL, URIS_REL, URI_NODE};
use crate::properties::{serialize_properties, Absent};
use crate::spaces::SemanticSpaces;
use crate::view::{entity_view, node_view};

/// A node the emitter wrote (or matched) and can link to.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub identifier: Identifier,
    pub external_id: ExternalRef,
    /// The node's view, with minted ids filled in.
    pub view: Value,
}

/// How the primary edge to a child is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWrite {
    /// `CREATE`: the edge cannot exist yet.
    Create,
    /// `MERGE` on the relation type and primary marker, then overwrite properties.
    Merge,
}

pub struct CreateEmitter<'a> {
    schema: &'a SchemaRegistry,
    settings: &'a WriteSettings,
    username: &'a str,
}

impl<'a> CreateEmitter<'a> {
    pub fn new(schema: &'a SchemaRegistry, settings: &'a WriteSettings, username: &'a str) -> Self {
        Self {
            schema,
            settings,
            username,
        }
    }

    pub fn schema(&self) -> &'a SchemaRegistry {
        self.schema
    }

    pub fn settings(&self) -> &'a WriteSettings {
        self.settings
    }

    pub fn username(&self) -> &'a str {
        self.username
    }

    /// Create `entity` in the given role inside `spaces`, then every child
    /// beneath it.
    pub fn emit_create(
        &self,
        entity: &Entity,
        acc: &mut QueryAccumulator,
        role: NodeRole,
        spaces: &SemanticSpaces,
    ) -> Result<Emitted, GraphError> {
        if entity.kind != EntityKind::New {
            return Err(TesseraError::invalid_entity(
                &entity.type_name,
                format!("cannot create an entity of kind {:?}", entity.kind),
            )
            .into());
        }
        let descriptor = self.schema.get(&entity.type_name)?;
        check_fields(entity, descriptor)?;

        let identifier = acc.next_identifier();
        let mut entity_uris = entity.uris.clone();
        let id = match &entity.id {
            None => ExternalId::new(),
            Some(ExternalRef::Id(id)) => *id,
            // A URI given as the id becomes one of the node's URIs.
            Some(ExternalRef::Uri(uri)) => {
                entity_uris.push(uri.clone());
                ExternalId::new()
            }
        };
        if role.is_head() {
            acc.set_head(id, &entity.type_name, identifier.clone());
        }

        let mut props = serialize_properties(
            &entity.type_name,
            &descriptor.properties,
            &entity.properties,
            Absent::Omit,
        )?;
        insert_system_properties(&mut props, entity, id, role, acc, Absent::Omit);
        spaces.insert_into(&mut props);
        props.insert("is_deleted".to_string(), Value::Bool(false));
        props.insert("marked_for_delete".to_string(), Value::Bool(false));
        let p = acc.register_param(props);
        acc.append_create(format!(
            "CREATE ({identifier}{} ${p})",
            label_string(descriptor, role)
        ));
        tracing::debug!(type_name = %entity.type_name, %id, ?role, "Create node");

        if role.is_head() {
            entity_uris.push(self.settings.canonical_uri(&entity.type_name, &id));
        }
        append_uris(acc, &identifier, &entity_uris);

        let inner = spaces.enter(descriptor);
        let mut relation_views = BTreeMap::new();
        for field in &descriptor.fields {
            let Some(children) = entity.relations.get(&field.name) else {
                continue;
            };
            let mut views = Vec::with_capacity(children.len());
            for child in children {
                let emitted = self.emit_child(
                    descriptor,
                    field,
                    child,
                    &identifier,
                    id,
                    acc,
                    EdgeWrite::Create,
                    &inner,
                )?;
                views.push(emitted.view);
            }
            relation_views.insert(field.name.clone(), views);
        }

        // The canonical URI is derived, so it stays out of the view.
        let view = match &entity.id {
            Some(ExternalRef::Uri(uri)) => {
                let with_uri = entity.clone().with_uri(uri);
                node_view(&with_uri, Some(&ExternalRef::Id(id)), relation_views)?
            }
            _ => node_view(entity, Some(&ExternalRef::Id(id)), relation_views)?,
        };

        if role.is_head() {
            append_creation_record(acc, &identifier, &view, self.username)?;
        }

        Ok(Emitted {
            identifier,
            external_id: ExternalRef::Id(id),
            view,
        })
    }

    /// Write one new or referenced child of `source` and its primary edge.
    /// `spaces` is the scope the child is written in.
    ///
    /// Edits of existing children are the update reconciler's job and are
    /// rejected here.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_child(
        &self,
        source: &TypeDescriptor,
        field: &FieldDescriptor,
        child: &Entity,
        source_identifier: &Identifier,
        source_id: ExternalId,
        acc: &mut QueryAccumulator,
        edge: EdgeWrite,
        spaces: &SemanticSpaces,
    ) -> Result<Emitted, GraphError> {
        let child_type = self.schema.get(&child.type_name)?;
        let write = classify(field, child, child_type)?;

        match write {
            ChildWrite::Embedded => {
                let emitted = self.emit_create(child, acc, NodeRole::Embedded, spaces)?;
                let props = primary_edge_properties(field, child, Ownership::Embedded, spaces)?;
                write_edge(acc, edge, source_identifier, field, &emitted.identifier, props);
                Ok(emitted)
            }
            ChildWrite::Inline => {
                let role = NodeRole::Inline {
                    edit_inline: field.edit_inline,
                };
                let emitted = self.emit_create(child, acc, role, spaces)?;
                let props = primary_edge_properties(field, child, Ownership::Owned, spaces)?;
                append_derived_edges(acc, field, source_id, &emitted.external_id, &props)?;
                write_edge(acc, edge, source_identifier, field, &emitted.identifier, props);
                Ok(emitted)
            }
            ChildWrite::SemanticSpace => {
                let emitted = self.emit_create(child, acc, NodeRole::SemanticSpace, spaces)?;
                let props = primary_edge_properties(field, child, Ownership::Owned, spaces)?;
                append_derived_edges(acc, field, source_id, &emitted.external_id, &props)?;
                write_edge(acc, edge, source_identifier, field, &emitted.identifier, props);
                Ok(emitted)
            }
            ChildWrite::Reified => {
                let emitted = self.emit_create(child, acc, NodeRole::Reified, spaces)?;
                let props = primary_edge_properties(field, child, Ownership::Owned, spaces)?;
                if !source.reified {
                    self.append_shortcut(acc, field, source_id, child, &emitted.external_id, &props)?;
                }
                write_edge(acc, edge, source_identifier, field, &emitted.identifier, props);
                Ok(emitted)
            }
            ChildWrite::Reference => {
                let (identifier, target) = match_reference(child, acc)?;
                let props = primary_edge_properties(field, child, Ownership::Referenced, spaces)?;
                append_derived_edges(acc, field, source_id, &target, &props)?;
                write_edge(acc, edge, source_identifier, field, &identifier, props);
                Ok(Emitted {
                    identifier,
                    external_id: target,
                    view: entity_view(child)?,
                })
            }
            ChildWrite::ReferenceCreate => {
                let emitted = self.merge_reference_create(child, child_type, acc)?;
                let props = primary_edge_properties(field, child, Ownership::Referenced, spaces)?;
                append_derived_edges(acc, field, source_id, &emitted.external_id, &props)?;
                write_edge(acc, edge, source_identifier, field, &emitted.identifier, props);
                Ok(emitted)
            }
            ChildWrite::EditEmbedded
            | ChildWrite::EditInline
            | ChildWrite::EditReified
            | ChildWrite::EditSemanticSpace => {
                Err(TesseraError::invalid_entity(
                    &child.type_name,
                    format!("existing entity under new parent (field '{}')", field.name),
                )
                .into())
            }
        }
    }

    /// Defer the shortcut past a reified child, if it carries a minted id.
    pub(crate) fn append_shortcut(
        &self,
        acc: &mut QueryAccumulator,
        field: &FieldDescriptor,
        source_id: ExternalId,
        child: &Entity,
        reified: &ExternalRef,
        props: &Map<String, Value>,
    ) -> Result<(), GraphError> {
        let reified_id = reified.as_id().ok_or_else(|| {
            TesseraError::invalid_entity(&child.type_name, "reified relation without an id")
        })?;
        let chain = self.schema.reified_chain_relations(&child.type_name)?;
        append_shortcut_edges(acc, field, source_id, reified_id, &chain, props)
    }

    /// `MERGE` a node by id or URI, creating it with its properties if absent.
    fn merge_reference_create(
        &self,
        child: &Entity,
        descriptor: &TypeDescriptor,
        acc: &mut QueryAccumulator,
    ) -> Result<Emitted, GraphError> {
        let reference = reference_of(child)?;
        if !child.relations.is_empty() {
            return Err(TesseraError::invalid_entity(
                &child.type_name,
                "reference-create entities cannot carry relations",
            )
            .into());
        }

        let minted = reference.as_id().unwrap_or_else(ExternalId::new);
        let creation_view = node_view(child, Some(&ExternalRef::Id(minted)), BTreeMap::new())?;
        let record = AuditRecord::creation(&creation_view, self.username)?;

        let mut props = serialize_properties(
            &child.type_name,
            &descriptor.properties,
            &child.properties,
            Absent::Omit,
        )?;
        insert_system_properties(
            &mut props,
            child,
            minted,
            NodeRole::ReferenceCreate,
            acc,
            Absent::Omit,
        );
        props.insert("is_deleted".to_string(), Value::Bool(false));
        props.insert("marked_for_delete".to_string(), Value::Bool(false));
        props.insert(
            CREATION_MARKER.to_string(),
            Value::String(record.id.to_string()),
        );

        let t = acc.next_identifier();
        let labels = label_string(descriptor, NodeRole::ReferenceCreate);
        let p = acc.register_param(props);
        let merge = match &reference {
            ExternalRef::Id(id) => {
                let pid = acc.register_param(id.to_string());
                format!("MERGE ({t}:{INDEXABLE} {{id: ${pid}}})")
            }
            ExternalRef::Uri(uri) => {
                let pu = acc.register_param(uri.as_str());
                let u = acc.next_identifier();
                format!(
                    "MERGE ({u}:{URI_NODE} {{uri: ${pu}}})\nMERGE ({t}:{INDEXABLE})-[:{URIS_REL}]->({u})"
                )
            }
        };
        acc.append_create(format!("{merge}\nON CREATE SET {t} += ${p}, {t}{labels}"));

        // The canonical URI only makes sense once we know this write created the node.
        let canonical = acc.register_param(self.settings.canonical_uri(&child.type_name, &minted));
        let canon = acc.next_identifier();
        let extra = vec![
            format!("  MERGE ({canon}:{URI_NODE} {{uri: ${canonical}}})"),
            format!("  MERGE ({t})-[:{URIS_REL}]->({canon})"),
        ];
        let marker = acc.register_param(record.id.to_string());
        append_conditional_creation(acc, &t, &record, &marker, &extra, self.username)?;
        append_uris(acc, &t, &child.uris);

        tracing::debug!(type_name = %child.type_name, reference = %reference, "Merge reference-create node");
        Ok(Emitted {
            identifier: t,
            external_id: reference,
            view: entity_view(child)?,
        })
    }
}

/// Reject relation fields the entity's type does not declare.
pub(crate) fn check_fields(entity: &Entity, descriptor: &TypeDescriptor) -> Result<(), TesseraError> {
    match entity
        .relations
        .keys()
        .find(|name| descriptor.field(name).is_none())
    {
        Some(unknown) => Err(TesseraError::invalid_entity(
            &entity.type_name,
            format!("undeclared field '{unknown}'"),
        )),
        None => Ok(()),
    }
}

/// `id`, `type`, `label`, and for owned non-head nodes the owning head.
pub(crate) fn insert_system_properties(
    props: &mut Map<String, Value>,
    entity: &Entity,
    id: ExternalId,
    role: NodeRole,
    acc: &QueryAccumulator,
    absent: Absent,
) {
    props.insert("id".to_string(), Value::String(id.to_string()));
    props.insert("type".to_string(), Value::String(entity.type_name.clone()));
    match &entity.label {
        Some(label) => {
            props.insert("label".to_string(), Value::String(label.clone()));
        }
        None if absent == Absent::Null => {
            props.insert("label".to_string(), Value::Null);
        }
        None => {}
    }
    if !matches!(role, NodeRole::Head | NodeRole::ReferenceCreate) {
        if let Some(head_id) = acc.head_id() {
            props.insert("head_id".to_string(), Value::String(head_id.to_string()));
        }
        if let Some(head_type) = acc.head_type() {
            props.insert("head_type".to_string(), Value::String(head_type.to_string()));
        }
    }
}

/// `MERGE` each URI node and link it to `node`.
pub(crate) fn append_uris(acc: &mut QueryAccumulator, node: &Identifier, uris: &[String]) {
    let mut seen: Vec<&str> = Vec::new();
    for uri in uris {
        if seen.contains(&uri.as_str()) {
            continue;
        }
        seen.push(uri);
        let p = acc.register_param(uri.as_str());
        let u = acc.next_identifier();
        acc.append_merge(format!(
            "MERGE ({u}:{URI_NODE} {{uri: ${p}}})\nMERGE ({node})-[:{URIS_REL}]->({u})"
        ));
    }
}

pub(crate) fn reference_of(child: &Entity) -> Result<ExternalRef, TesseraError> {
    child.id.clone().ok_or_else(|| {
        TesseraError::invalid_entity(&child.type_name, "reference without an id or URI")
    })
}

/// `MATCH` the referenced node, by id or through one of its URIs.
pub(crate) fn match_reference(
    child: &Entity,
    acc: &mut QueryAccumulator,
) -> Result<(Identifier, ExternalRef), GraphError> {
    let reference = reference_of(child)?;
    if !child.relations.is_empty() {
        return Err(TesseraError::invalid_entity(
            &child.type_name,
            "references cannot carry relations",
        )
        .into());
    }
    let t = acc.next_identifier();
    match &reference {
        ExternalRef::Id(id) => {
            let p = acc.register_param(id.to_string());
            acc.append_match(format!("MATCH ({t}:{INDEXABLE} {{id: ${p}}})"));
        }
        ExternalRef::Uri(uri) => {
            let p = acc.register_param(uri.as_str());
            acc.append_match(format!(
                "CALL {{\n  MATCH (:{URI_NODE} {{uri: ${p}}})<-[:{URIS_REL}]-(found:{INDEXABLE})\n  RETURN found AS {t} LIMIT 1\n}}"
            ));
        }
    }
    Ok((t, reference))
}

/// Write the primary edge from `source` to `target`.
pub(crate) fn write_edge(
    acc: &mut QueryAccumulator,
    mode: EdgeWrite,
    source: &Identifier,
    field: &FieldDescriptor,
    target: &Identifier,
    props: Map<String, Value>,
) {
    let rel_type = field.relation_type();
    let p = acc.register_param(props);
    match mode {
        EdgeWrite::Create => {
            acc.append_create(format!("CREATE ({source})-[:{rel_type} ${p}]->({target})"));
        }
        EdgeWrite::Merge => {
            let r = acc.next_identifier();
            acc.append_merge(format!(
                "MERGE ({source})-[{r}:{rel_type} {{{PRIMARY_REL}: true}}]->({target})\nSET {r} = ${p}"
            ));
        }
    }
}
