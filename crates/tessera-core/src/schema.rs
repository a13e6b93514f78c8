//! Schema registry: compiled type and field descriptors.
//!
//! A [`SchemaDocument`] declares entity types, reified-relation types, their
//! properties, and their relation fields. [`SchemaRegistry::initialize`]
//! compiles it in two passes: every type name is registered first, then
//! supertypes, targets, and subclassed relations are resolved against the
//! full name set. Forward and self references therefore work regardless of
//! declaration order.
//!
//! The registry is an explicit value. Callers build one at startup and
//! pass it to the write engine by reference.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Label carried by every non-reified entity node.
pub const BASE_NODE_LABEL: &str = "BaseNode";

/// Reverse name given to embedded fields.
pub const EMBEDDED_REVERSE_NAME: &str = "embedded_in";

/// Relation field of a semantic space that holds the statements it frames.
pub const SEMANTIC_SPACE_CONTENTS: &str = "contents";

const RESERVED_NAMES: &[&str] = &["id", "type", "label", "uris", "edge_properties", "kind"];

// ── Schema Documents ─────────────────────────────────────────────

/// Declarative schema input, usually read from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
}

impl SchemaDocument {
    pub fn with_type(mut self, definition: TypeDefinition) -> Self {
        self.types.push(definition);
        self
    }
}

/// How a declared property is stored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// One database primitive (or a homogeneous list of them).
    #[default]
    Literal,
    /// A list, set, or tuple of primitives.
    List,
    /// A value plus named parts, flattened into several properties.
    MultiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: PropertyKind,
    /// Declared part names of a multi-key property.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<String>,
}

impl PropertyDescriptor {
    pub fn literal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Literal,
            parts: Vec::new(),
        }
    }

    pub fn list(name: &str) -> Self {
        Self {
            kind: PropertyKind::List,
            ..Self::literal(name)
        }
    }

    pub fn multi_key(name: &str, parts: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::MultiKey,
            parts: parts.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    /// Whether instances are reified-relation wrappers rather than entities.
    #[serde(default)]
    pub reified: bool,
    /// Relation field that points from the wrapper at its target.
    #[serde(default)]
    pub target: Option<String>,
    /// Whether instances frame their `contents` (negated, hypothetical, ...)
    /// rather than stand as entities. Inherited by subtypes.
    #[serde(default)]
    pub semantic_space: bool,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
    #[serde(default)]
    pub embedded: Vec<EmbeddedDefinition>,
}

impl TypeDefinition {
    pub fn entity(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supertypes: Vec::new(),
            traits: Vec::new(),
            reified: false,
            target: None,
            semantic_space: false,
            properties: Vec::new(),
            relations: Vec::new(),
            embedded: Vec::new(),
        }
    }

    /// A reified-relation type whose `target_field` relation points at `targets`.
    pub fn reified(name: &str, target_field: &str, reverse_name: &str, targets: &[&str]) -> Self {
        let mut def = Self::entity(name);
        def.reified = true;
        def.target = Some(target_field.to_string());
        def.relations.push(
            RelationDefinition::new(target_field, reverse_name, targets)
                .create_inline()
                .create_by_reference(),
        );
        def
    }

    /// A semantic-space type whose `contents` relation holds `targets` inline.
    pub fn semantic_space(name: &str, reverse_name: &str, targets: &[&str]) -> Self {
        let mut def = Self::entity(name);
        def.semantic_space = true;
        def.relations.push(
            RelationDefinition::new(SEMANTIC_SPACE_CONTENTS, reverse_name, targets)
                .create_inline()
                .edit_inline(),
        );
        def
    }

    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertypes.push(supertype.to_string());
        self
    }

    pub fn with_trait(mut self, name: &str) -> Self {
        self.traits.push(name.to_string());
        self
    }

    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(descriptor);
        self
    }

    pub fn relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn embedded(mut self, name: &str, targets: &[&str]) -> Self {
        self.embedded.push(EmbeddedDefinition {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub reverse_name: String,
    pub targets: Vec<String>,
    #[serde(default)]
    pub create_inline: bool,
    #[serde(default)]
    pub edit_inline: bool,
    #[serde(default)]
    pub create_by_reference: bool,
    #[serde(default)]
    pub edge_properties: Vec<PropertyDescriptor>,
    /// Relations (declared on a supertype) this relation specializes.
    #[serde(default)]
    pub subclasses: Vec<String>,
}

impl RelationDefinition {
    pub fn new(name: &str, reverse_name: &str, targets: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            reverse_name: reverse_name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            create_inline: false,
            edit_inline: false,
            create_by_reference: false,
            edge_properties: Vec::new(),
            subclasses: Vec::new(),
        }
    }

    pub fn create_inline(mut self) -> Self {
        self.create_inline = true;
        self
    }

    pub fn edit_inline(mut self) -> Self {
        self.edit_inline = true;
        self
    }

    pub fn create_by_reference(mut self) -> Self {
        self.create_by_reference = true;
        self
    }

    pub fn subclassing(mut self, parent: &str) -> Self {
        self.subclasses.push(parent.to_string());
        self
    }

    pub fn edge_property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.edge_properties.push(descriptor);
        self
    }
}

/// A field holding owned, identity-less value nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedDefinition {
    pub name: String,
    pub targets: Vec<String>,
}

// ── Compiled Descriptors ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Relation,
    Embedded,
}

/// A compiled relation or embedded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub reverse_name: String,
    /// Concrete accepted types, subtypes of declared targets included.
    pub target_types: Vec<String>,
    pub create_inline: bool,
    pub edit_inline: bool,
    pub create_by_reference: bool,
    pub edge_properties: Vec<PropertyDescriptor>,
    /// `(forward, reverse)` names of every relation this one specializes.
    pub subclassed_relations: Vec<(String, String)>,
    /// This relation's name followed by every forward synonym.
    pub relation_labels: Vec<String>,
    /// The reverse name followed by every reverse synonym.
    pub reverse_relation_labels: Vec<String>,
}

impl FieldDescriptor {
    pub fn is_embedded(&self) -> bool {
        self.kind == FieldKind::Embedded
    }

    /// Relationship type used in Cypher.
    pub fn relation_type(&self) -> String {
        self.name.to_uppercase()
    }

    pub fn reverse_relation_type(&self) -> String {
        self.reverse_name.to_uppercase()
    }

    pub fn accepts(&self, type_name: &str) -> bool {
        self.target_types.iter().any(|t| t == type_name)
    }
}

/// A compiled entity or reified-relation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    /// Node labels: the type, its ancestors, its traits, and `BaseNode`
    /// unless the type is reified or a semantic space.
    pub labels: Vec<String>,
    pub supertypes: Vec<String>,
    pub reified: bool,
    pub semantic_space: bool,
    pub target_field: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn target_field_descriptor(&self) -> Option<&FieldDescriptor> {
        self.target_field.as_deref().and_then(|name| self.field(name))
    }
}

// ── Registry ─────────────────────────────────────────────────────

/// Compiled descriptors keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, TypeDescriptor>,
    initialized: bool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a document into a fresh, initialized registry.
    pub fn compile(document: &SchemaDocument) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.initialize(document)?;
        Ok(registry)
    }

    /// Compile `document`, replacing the current contents.
    ///
    /// On error the registry is left as it was.
    pub fn initialize(&mut self, document: &SchemaDocument) -> Result<(), SchemaError> {
        let types = Compiler::new(document)?.compile()?;
        tracing::debug!(types = types.len(), "Schema registry initialized");
        self.types = types;
        self.initialized = true;
        Ok(())
    }

    /// Drop every descriptor. Lookups fail until the next `initialize`.
    pub fn reset(&mut self) {
        self.types.clear();
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn get(&self, type_name: &str) -> Result<&TypeDescriptor, SchemaError> {
        if !self.initialized {
            return Err(SchemaError::NotInitialized);
        }
        self.types
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.to_string(),
                referenced_by: "entity".to_string(),
            })
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Relationship types that lead from a reified wrapper of `type_name`
    /// through any nested wrappers to the final target.
    pub fn reified_chain_relations(&self, type_name: &str) -> Result<Vec<String>, SchemaError> {
        let mut visited = BTreeSet::new();
        let mut relations = BTreeSet::new();
        let mut pending = vec![type_name.to_string()];

        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let descriptor = self.get(&name)?;
            if !descriptor.reified {
                continue;
            }
            let target = descriptor
                .target_field_descriptor()
                .ok_or_else(|| SchemaError::MissingTarget(name.clone()))?;
            relations.insert(target.relation_type());
            for t in &target.target_types {
                if self.get(t)?.reified {
                    pending.push(t.clone());
                }
            }
        }

        Ok(relations.into_iter().collect())
    }
}

// ── Compilation ──────────────────────────────────────────────────

struct Compiler<'a> {
    definitions: HashMap<&'a str, &'a TypeDefinition>,
    order: Vec<&'a str>,
}

impl<'a> Compiler<'a> {
    /// First pass: register every name.
    fn new(document: &'a SchemaDocument) -> Result<Self, SchemaError> {
        let mut definitions = HashMap::new();
        let mut order = Vec::new();
        for def in &document.types {
            check_name(&def.name)?;
            if definitions.insert(def.name.as_str(), def).is_some() {
                return Err(SchemaError::DuplicateType(def.name.clone()));
            }
            order.push(def.name.as_str());
        }
        Ok(Self { definitions, order })
    }

    /// Second pass: resolve every reference against the registered names.
    fn compile(&self) -> Result<BTreeMap<String, TypeDescriptor>, SchemaError> {
        let mut ancestors = HashMap::new();
        for name in &self.order {
            let resolved = self.ancestors(name, &mut Vec::new())?;
            ancestors.insert(*name, resolved);
        }

        let mut compiled = BTreeMap::new();
        for name in &self.order {
            let descriptor = self.compile_type(name, &ancestors)?;
            compiled.insert(name.to_string(), descriptor);
        }
        Ok(compiled)
    }

    fn definition(&self, name: &str, referenced_by: &str) -> Result<&'a TypeDefinition, SchemaError> {
        self.definitions
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownType {
                name: name.to_string(),
                referenced_by: referenced_by.to_string(),
            })
    }

    /// Transitive supertypes, nearest first.
    fn ancestors(&self, name: &str, path: &mut Vec<String>) -> Result<Vec<String>, SchemaError> {
        if path.iter().any(|p| p == name) {
            return Err(SchemaError::InheritanceCycle(name.to_string()));
        }
        path.push(name.to_string());

        let def = self.definition(name, "supertype list")?;
        let mut out: Vec<String> = Vec::new();
        for sup in &def.supertypes {
            self.definition(sup, &format!("supertypes of '{name}'"))?;
            if !out.contains(sup) {
                out.push(sup.clone());
            }
            for inherited in self.ancestors(sup, path)? {
                if !out.contains(&inherited) {
                    out.push(inherited);
                }
            }
        }

        path.pop();
        Ok(out)
    }

    /// Every type equal to or descending from `name`.
    fn concrete_types(&self, name: &str, ancestors: &HashMap<&str, Vec<String>>) -> Vec<String> {
        self.order
            .iter()
            .filter(|candidate| {
                **candidate == name
                    || ancestors
                        .get(*candidate)
                        .is_some_and(|a| a.iter().any(|s| s == name))
            })
            .map(|c| c.to_string())
            .collect()
    }

    /// Relation definitions visible on a type: inherited first, own last.
    fn effective_relations(
        &self,
        name: &str,
        ancestors: &HashMap<&str, Vec<String>>,
    ) -> Vec<&'a RelationDefinition> {
        let mut lineage: Vec<&str> = ancestors
            .get(name)
            .map(|a| a.iter().rev().map(String::as_str).collect())
            .unwrap_or_default();
        lineage.push(name);

        let mut out: Vec<&RelationDefinition> = Vec::new();
        for ty in lineage {
            let Some(def) = self.definitions.get(ty).copied() else {
                continue;
            };
            for rel in &def.relations {
                out.retain(|existing| existing.name != rel.name);
                out.push(rel);
            }
        }
        out
    }

    fn compile_type(
        &self,
        name: &str,
        ancestors: &HashMap<&str, Vec<String>>,
    ) -> Result<TypeDescriptor, SchemaError> {
        let def = self.definition(name, "type list")?;
        let supertypes = ancestors.get(name).cloned().unwrap_or_default();

        let mut lineage: Vec<&TypeDefinition> = Vec::new();
        for sup in supertypes.iter().rev() {
            lineage.push(self.definition(sup, name)?);
        }
        lineage.push(def);

        let mut labels = vec![def.name.clone()];
        labels.extend(supertypes.iter().cloned());
        let mut properties: Vec<PropertyDescriptor> = Vec::new();
        let mut embedded: Vec<&EmbeddedDefinition> = Vec::new();
        for ty in &lineage {
            for t in &ty.traits {
                check_name(t)?;
                if !labels.contains(t) {
                    labels.push(t.clone());
                }
            }
            for prop in &ty.properties {
                check_field_name(&prop.name)?;
                properties.retain(|p| p.name != prop.name);
                properties.push(prop.clone());
            }
            for emb in &ty.embedded {
                embedded.retain(|e| e.name != emb.name);
                embedded.push(emb);
            }
        }
        let semantic_space = lineage.iter().any(|ty| ty.semantic_space);
        if semantic_space && def.reified {
            return Err(SchemaError::InvalidSemanticSpace {
                type_name: name.to_string(),
                reason: "a reified relation cannot be a semantic space".to_string(),
            });
        }
        if !def.reified && !semantic_space && !labels.iter().any(|l| l == BASE_NODE_LABEL) {
            labels.push(BASE_NODE_LABEL.to_string());
        }

        let relations = self.effective_relations(name, ancestors);
        let mut fields = Vec::new();
        for rel in &relations {
            fields.push(self.compile_relation(name, rel, &relations, ancestors)?);
        }
        for emb in embedded {
            if fields.iter().any(|f: &FieldDescriptor| f.name == emb.name) {
                return Err(SchemaError::DuplicateField {
                    type_name: name.to_string(),
                    field: emb.name.clone(),
                });
            }
            fields.push(self.compile_embedded(name, emb, ancestors)?);
        }
        for prop in &properties {
            if fields.iter().any(|f| f.name == prop.name) {
                return Err(SchemaError::DuplicateField {
                    type_name: name.to_string(),
                    field: prop.name.clone(),
                });
            }
        }

        if semantic_space
            && !fields
                .iter()
                .any(|f| f.name == SEMANTIC_SPACE_CONTENTS && f.kind == FieldKind::Relation)
        {
            return Err(SchemaError::InvalidSemanticSpace {
                type_name: name.to_string(),
                reason: format!("missing the '{SEMANTIC_SPACE_CONTENTS}' relation"),
            });
        }

        let target_field = if def.reified {
            let target = def
                .target
                .clone()
                .ok_or_else(|| SchemaError::MissingTarget(name.to_string()))?;
            if !fields
                .iter()
                .any(|f| f.name == target && f.kind == FieldKind::Relation)
            {
                return Err(SchemaError::MissingTarget(name.to_string()));
            }
            Some(target)
        } else {
            None
        };

        Ok(TypeDescriptor {
            name: name.to_string(),
            labels,
            supertypes,
            reified: def.reified,
            semantic_space,
            target_field,
            properties,
            fields,
        })
    }

    fn resolve_targets(
        &self,
        type_name: &str,
        field: &str,
        targets: &[String],
        ancestors: &HashMap<&str, Vec<String>>,
    ) -> Result<Vec<String>, SchemaError> {
        if targets.is_empty() {
            return Err(SchemaError::EmptyTargets {
                type_name: type_name.to_string(),
                field: field.to_string(),
            });
        }
        let mut concrete = BTreeSet::new();
        for target in targets {
            self.definition(target, &format!("field '{type_name}.{field}'"))?;
            concrete.extend(self.concrete_types(target, ancestors));
        }
        Ok(concrete.into_iter().collect())
    }

    fn compile_relation(
        &self,
        type_name: &str,
        rel: &RelationDefinition,
        visible: &[&RelationDefinition],
        ancestors: &HashMap<&str, Vec<String>>,
    ) -> Result<FieldDescriptor, SchemaError> {
        check_field_name(&rel.name)?;
        check_name(&rel.reverse_name)?;
        for prop in &rel.edge_properties {
            check_field_name(&prop.name)?;
        }

        let target_types = self.resolve_targets(type_name, &rel.name, &rel.targets, ancestors)?;

        let mut subclassed = Vec::new();
        collect_subclassed(type_name, rel, visible, &mut subclassed, &mut Vec::new())?;

        let mut relation_labels = vec![rel.name.clone()];
        let mut reverse_relation_labels = vec![rel.reverse_name.clone()];
        for (fwd, rev) in &subclassed {
            if !relation_labels.contains(fwd) {
                relation_labels.push(fwd.clone());
            }
            if !reverse_relation_labels.contains(rev) {
                reverse_relation_labels.push(rev.clone());
            }
        }

        Ok(FieldDescriptor {
            name: rel.name.clone(),
            kind: FieldKind::Relation,
            reverse_name: rel.reverse_name.clone(),
            target_types,
            create_inline: rel.create_inline,
            edit_inline: rel.edit_inline,
            create_by_reference: rel.create_by_reference,
            edge_properties: rel.edge_properties.clone(),
            subclassed_relations: subclassed,
            relation_labels,
            reverse_relation_labels,
        })
    }

    fn compile_embedded(
        &self,
        type_name: &str,
        emb: &EmbeddedDefinition,
        ancestors: &HashMap<&str, Vec<String>>,
    ) -> Result<FieldDescriptor, SchemaError> {
        check_field_name(&emb.name)?;
        let target_types = self.resolve_targets(type_name, &emb.name, &emb.targets, ancestors)?;
        Ok(FieldDescriptor {
            name: emb.name.clone(),
            kind: FieldKind::Embedded,
            reverse_name: EMBEDDED_REVERSE_NAME.to_string(),
            target_types,
            create_inline: true,
            edit_inline: true,
            create_by_reference: false,
            edge_properties: Vec::new(),
            subclassed_relations: Vec::new(),
            relation_labels: vec![emb.name.clone()],
            reverse_relation_labels: vec![EMBEDDED_REVERSE_NAME.to_string()],
        })
    }
}

/// Walk `subclasses` transitively, collecting `(forward, reverse)` pairs.
fn collect_subclassed(
    type_name: &str,
    rel: &RelationDefinition,
    visible: &[&RelationDefinition],
    out: &mut Vec<(String, String)>,
    path: &mut Vec<String>,
) -> Result<(), SchemaError> {
    path.push(rel.name.clone());
    for parent_name in &rel.subclasses {
        if path.contains(parent_name) {
            return Err(SchemaError::InheritanceCycle(parent_name.clone()));
        }
        let parent = visible
            .iter()
            .find(|r| &r.name == parent_name)
            .ok_or_else(|| SchemaError::UnknownSubclassedRelation {
                type_name: type_name.to_string(),
                field: rel.name.clone(),
                parent: parent_name.clone(),
            })?;
        let pair = (parent.name.clone(), parent.reverse_name.clone());
        if !out.contains(&pair) {
            out.push(pair);
        }
        collect_subclassed(type_name, parent, visible, out, path)?;
    }
    path.pop();
    Ok(())
}

/// Names end up in Cypher text, so they must be plain identifiers.
fn check_name(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidName(name.to_string()))
    }
}

fn check_field_name(name: &str) -> Result<(), SchemaError> {
    check_name(name)?;
    if RESERVED_NAMES.contains(&name) || name.starts_with("_pg") || name.contains("____") {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> SchemaDocument {
        SchemaDocument::default()
            // Declared before the types it references.
            .with_type(
                TypeDefinition::entity("Order")
                    .property(PropertyDescriptor::literal("quantity"))
                    .property(PropertyDescriptor::multi_key("placed", &["precision"]))
                    .relation(
                        RelationDefinition::new("customer", "placed_order", &["Agent"])
                            .create_by_reference(),
                    )
                    .relation(RelationDefinition::new("previous", "next", &["Order"]))
                    .embedded("notes", &["Note"]),
            )
            .with_type(TypeDefinition::entity("Agent").with_trait("Auditable"))
            .with_type(
                TypeDefinition::entity("Person")
                    .extends("Agent")
                    .property(PropertyDescriptor::literal("name")),
            )
            .with_type(TypeDefinition::entity("Note").property(PropertyDescriptor::literal("text")))
    }

    #[test]
    fn test_forward_and_self_references_resolve() {
        let registry = SchemaRegistry::compile(&catalogue()).unwrap();
        let order = registry.get("Order").unwrap();
        assert_eq!(order.field("previous").unwrap().target_types, ["Order"]);
    }

    #[test]
    fn test_targets_include_subtypes() {
        let registry = SchemaRegistry::compile(&catalogue()).unwrap();
        let customer = registry.get("Order").unwrap().field("customer").unwrap();
        assert_eq!(customer.target_types, ["Agent", "Person"]);
        assert!(customer.accepts("Person"));
        assert!(!customer.accepts("Order"));
    }

    #[test]
    fn test_labels_include_ancestors_traits_and_base() {
        let registry = SchemaRegistry::compile(&catalogue()).unwrap();
        let person = registry.get("Person").unwrap();
        assert_eq!(person.labels, ["Person", "Agent", "Auditable", "BaseNode"]);
    }

    #[test]
    fn test_embedded_field_uses_fixed_reverse_name() {
        let registry = SchemaRegistry::compile(&catalogue()).unwrap();
        let notes = registry.get("Order").unwrap().field("notes").unwrap();
        assert!(notes.is_embedded());
        assert_eq!(notes.reverse_name, EMBEDDED_REVERSE_NAME);
        assert_eq!(notes.relation_type(), "NOTES");
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let doc = SchemaDocument::default().with_type(
            TypeDefinition::entity("Order")
                .relation(RelationDefinition::new("customer", "placed_order", &["Ghost"])),
        );
        let err = SchemaRegistry::compile(&doc).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { ref name, .. } if name == "Ghost"));
    }

    #[test]
    fn test_reified_type_requires_target() {
        let mut def = TypeDefinition::entity("Identification");
        def.reified = true;
        let doc = SchemaDocument::default().with_type(def);
        assert_eq!(
            SchemaRegistry::compile(&doc).unwrap_err(),
            SchemaError::MissingTarget("Identification".into())
        );
    }

    #[test]
    fn test_reified_type_has_no_base_label() {
        let doc = catalogue().with_type(TypeDefinition::reified(
            "Identification",
            "target",
            "is_target_of",
            &["Person"],
        ));
        let registry = SchemaRegistry::compile(&doc).unwrap();
        let ident = registry.get("Identification").unwrap();
        assert_eq!(ident.labels, ["Identification"]);
        assert_eq!(ident.target_field_descriptor().unwrap().name, "target");
    }

    #[test]
    fn test_semantic_space_is_inherited_without_base_label() {
        let doc = catalogue()
            .with_type(TypeDefinition::semantic_space("Hypotheticals", "framed_by", &["Order"]))
            .with_type(TypeDefinition::entity("Hypothetical").extends("Hypotheticals"));
        let registry = SchemaRegistry::compile(&doc).unwrap();

        let concrete = registry.get("Hypothetical").unwrap();
        assert!(concrete.semantic_space);
        assert_eq!(concrete.labels, ["Hypothetical", "Hypotheticals"]);
        let contents = concrete.field(SEMANTIC_SPACE_CONTENTS).unwrap();
        assert_eq!(contents.target_types, ["Order"]);
        assert!(contents.create_inline && contents.edit_inline);
        assert!(!registry.get("Order").unwrap().semantic_space);
    }

    #[test]
    fn test_semantic_space_requires_contents() {
        let mut def = TypeDefinition::entity("Negation");
        def.semantic_space = true;
        let doc = SchemaDocument::default().with_type(def);
        assert!(matches!(
            SchemaRegistry::compile(&doc).unwrap_err(),
            SchemaError::InvalidSemanticSpace { ref type_name, .. } if type_name == "Negation"
        ));
    }

    #[test]
    fn test_subclassed_relations_accumulate_transitively() {
        let doc = SchemaDocument::default()
            .with_type(
                TypeDefinition::entity("Event")
                    .relation(RelationDefinition::new("involves", "involved_in", &["Agent"])),
            )
            .with_type(
                TypeDefinition::entity("Meeting").extends("Event").relation(
                    RelationDefinition::new("attendee", "attended", &["Agent"])
                        .subclassing("involves"),
                ),
            )
            .with_type(
                TypeDefinition::entity("Trial").extends("Meeting").relation(
                    RelationDefinition::new("defendant", "defended_in", &["Agent"])
                        .subclassing("attendee"),
                ),
            )
            .with_type(TypeDefinition::entity("Agent"));

        let registry = SchemaRegistry::compile(&doc).unwrap();
        let defendant = registry.get("Trial").unwrap().field("defendant").unwrap();
        assert_eq!(
            defendant.subclassed_relations,
            [
                ("attendee".to_string(), "attended".to_string()),
                ("involves".to_string(), "involved_in".to_string()),
            ]
        );
        assert_eq!(defendant.relation_labels, ["defendant", "attendee", "involves"]);
        assert_eq!(
            defendant.reverse_relation_labels,
            ["defended_in", "attended", "involved_in"]
        );
        // Inherited relations are visible on subtypes.
        assert!(registry.get("Trial").unwrap().field("involves").is_some());
    }

    #[test]
    fn test_unknown_subclassed_relation_is_rejected() {
        let doc = SchemaDocument::default()
            .with_type(TypeDefinition::entity("Agent"))
            .with_type(TypeDefinition::entity("Meeting").relation(
                RelationDefinition::new("attendee", "attended", &["Agent"]).subclassing("nope"),
            ));
        assert!(matches!(
            SchemaRegistry::compile(&doc).unwrap_err(),
            SchemaError::UnknownSubclassedRelation { .. }
        ));
    }

    #[test]
    fn test_inheritance_cycle_is_rejected() {
        let doc = SchemaDocument::default()
            .with_type(TypeDefinition::entity("A").extends("B"))
            .with_type(TypeDefinition::entity("B").extends("A"));
        assert!(matches!(
            SchemaRegistry::compile(&doc).unwrap_err(),
            SchemaError::InheritanceCycle(_)
        ));
    }

    #[test]
    fn test_names_must_be_identifiers() {
        let doc = SchemaDocument::default().with_type(TypeDefinition::entity("Bad Name"));
        assert_eq!(
            SchemaRegistry::compile(&doc).unwrap_err(),
            SchemaError::InvalidName("Bad Name".into())
        );

        let doc = SchemaDocument::default()
            .with_type(TypeDefinition::entity("Thing").property(PropertyDescriptor::literal("id")));
        assert_eq!(
            SchemaRegistry::compile(&doc).unwrap_err(),
            SchemaError::InvalidName("id".into())
        );
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let doc = SchemaDocument::default()
            .with_type(TypeDefinition::entity("A"))
            .with_type(TypeDefinition::entity("A"));
        assert_eq!(
            SchemaRegistry::compile(&doc).unwrap_err(),
            SchemaError::DuplicateType("A".into())
        );
    }

    #[test]
    fn test_reset_and_reinitialize() {
        let mut registry = SchemaRegistry::new();
        assert_eq!(registry.get("Order").unwrap_err(), SchemaError::NotInitialized);

        registry.initialize(&catalogue()).unwrap();
        assert!(registry.get("Order").is_ok());

        registry.reset();
        assert!(!registry.is_initialized());
        assert_eq!(registry.get("Order").unwrap_err(), SchemaError::NotInitialized);

        registry.initialize(&catalogue()).unwrap();
        assert!(registry.get("Person").is_ok());
    }

    #[test]
    fn test_failed_initialize_keeps_previous_contents() {
        let mut registry = SchemaRegistry::compile(&catalogue()).unwrap();
        let broken = SchemaDocument::default().with_type(TypeDefinition::entity("A").extends("Z"));
        assert!(registry.initialize(&broken).is_err());
        assert!(registry.get("Order").is_ok());
    }

    #[test]
    fn test_reified_chain_relations_follow_nested_wrappers() {
        let doc = catalogue()
            .with_type(TypeDefinition::reified(
                "Identification",
                "target",
                "is_target_of",
                &["Person"],
            ))
            .with_type(TypeDefinition::reified(
                "Attribution",
                "subject",
                "is_subject_of",
                &["Identification"],
            ));
        let registry = SchemaRegistry::compile(&doc).unwrap();
        assert_eq!(
            registry.reified_chain_relations("Attribution").unwrap(),
            ["SUBJECT", "TARGET"]
        );
        assert_eq!(
            registry.reified_chain_relations("Identification").unwrap(),
            ["TARGET"]
        );
    }

    #[test]
    fn test_document_parses_from_json() {
        let doc: SchemaDocument = serde_json::from_value(serde_json::json!({
            "types": [
                {
                    "name": "Person",
                    "properties": [{"name": "name"}, {"name": "born", "kind": "multi_key", "parts": ["precision"]}]
                },
                {
                    "name": "Identification",
                    "reified": true,
                    "target": "target",
                    "relations": [
                        {"name": "target", "reverse_name": "is_target_of", "targets": ["Person"], "create_inline": true}
                    ]
                }
            ]
        }))
        .unwrap();
        let registry = SchemaRegistry::compile(&doc).unwrap();
        let born = registry.get("Person").unwrap().property("born").unwrap();
        assert_eq!(born.kind, PropertyKind::MultiKey);
        assert_eq!(born.parts, ["precision"]);
    }
}
