//! Entry points that turn an entity tree into a [`WritePlan`].
//!
//! Planning is pure: nothing here talks to Neo4j. The executor supplies the
//! previous view for updates and runs the plan.

use serde_json::Value;
use tessera_core::{Entity, EntityKind, SchemaRegistry, TesseraError, WriteSettings};

use crate::accumulator::{QueryAccumulator, WritePlan};
use crate::client::GraphError;
use crate::create::CreateEmitter;
use crate::labels::NodeRole;
use crate::spaces::SemanticSpaces;
use crate::update::UpdateReconciler;

pub struct WriteEngine<'a> {
    schema: &'a SchemaRegistry,
    settings: &'a WriteSettings,
}

impl<'a> WriteEngine<'a> {
    pub fn new(schema: &'a SchemaRegistry, settings: &'a WriteSettings) -> Self {
        Self { schema, settings }
    }

    fn username<'u>(&'u self, username: Option<&'u str>) -> &'u str {
        username.unwrap_or(&self.settings.default_user)
    }

    /// Plan the creation of a new head entity and everything beneath it.
    pub fn plan_create(
        &self,
        entity: &Entity,
        username: Option<&str>,
    ) -> Result<WritePlan, GraphError> {
        if entity.kind != EntityKind::New {
            return Err(TesseraError::invalid_entity(
                &entity.type_name,
                "only new entities can be created",
            )
            .into());
        }
        let username = self.username(username);
        let mut acc = QueryAccumulator::new();
        let emitter = CreateEmitter::new(self.schema, self.settings, username);
        let head = emitter.emit_create(entity, &mut acc, NodeRole::Head, &SemanticSpaces::root())?;

        tracing::debug!(
            type_name = %entity.type_name,
            head = %head.external_id,
            fragments = acc.primary_fragment_count(),
            deferred = acc.deferred_fragment_count(),
            "Planned create"
        );
        acc.finish()
    }

    /// Plan an update of an existing head entity against its previous view.
    ///
    /// Returns `None` when the entity matches `previous` and nothing needs writing.
    pub fn plan_update(
        &self,
        entity: &Entity,
        previous: &Value,
        username: Option<&str>,
    ) -> Result<Option<WritePlan>, GraphError> {
        let username = self.username(username);
        let mut acc = QueryAccumulator::new();
        let reconciler = UpdateReconciler::new(self.schema, self.settings, username, previous);
        let outcome = reconciler.emit_update(entity, &mut acc)?;
        if !outcome.changed {
            return Ok(None);
        }
        acc.finish().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{ExternalId, PropertyDescriptor, SchemaDocument, TypeDefinition};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::compile(&SchemaDocument::default().with_type(
            TypeDefinition::entity("Person").property(PropertyDescriptor::literal("name")),
        ))
        .unwrap()
    }

    #[test]
    fn test_create_uses_default_user() {
        let registry = registry();
        let settings = WriteSettings::default();
        let engine = WriteEngine::new(&registry, &settings);
        let plan = engine
            .plan_create(&Entity::new("Person").with_property("name", "Ada"), None)
            .unwrap();
        assert_eq!(plan.head_type, "Person");
        assert!(plan.primary.params.values().any(|v| v == &json!("DefaultUser")));
        assert!(plan.deferred.is_none());
    }

    #[test]
    fn test_existing_entity_cannot_be_created() {
        let registry = registry();
        let settings = WriteSettings::default();
        let engine = WriteEngine::new(&registry, &settings);
        let err = engine
            .plan_create(&Entity::existing("Person", ExternalId::new()), Some("ada"))
            .unwrap_err();
        assert!(matches!(err, GraphError::Write(_)));
    }

    #[test]
    fn test_unchanged_update_plans_nothing() {
        let registry = registry();
        let settings = WriteSettings::default();
        let engine = WriteEngine::new(&registry, &settings);
        let id = ExternalId::new();
        let previous = json!({"type": "Person", "id": id.to_string(), "name": "Ada"});
        let entity = Entity::existing("Person", id).with_property("name", "Ada");
        assert!(engine.plan_update(&entity, &previous, None).unwrap().is_none());
    }
}
