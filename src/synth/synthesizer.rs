use super::{BaseType, FieldDescriptor, FieldOrigin, RuntimeType, TypeOptions};
use crate::cache::Bookkeeping;
use crate::config::EngineConfig;
use crate::core::{MutantError, Result, SchemaId};
use crate::definition::validate::verbose_name_from;
use crate::definition::{DefinitionSnapshot, FieldDefinition, RelationTarget};
use crate::registry::TypeRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Builds runtime types from definition snapshots.
///
/// Synthesis reads the registry and the snapshot only; it never touches a
/// store, so the same snapshot always yields the same shape.
pub struct TypeSynthesizer<'a> {
    registry: &'a TypeRegistry,
    config: &'a EngineConfig,
}

impl<'a> TypeSynthesizer<'a> {
    pub fn new(registry: &'a TypeRegistry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Synthesize the type of `snapshot`.
    ///
    /// `bookkeeping` is the subscriber state of the type being replaced, or a
    /// fresh one for a first synthesis.
    pub fn synthesize(
        &self,
        snapshot: &DefinitionSnapshot,
        bookkeeping: Arc<Bookkeeping>,
    ) -> Result<RuntimeType> {
        let schema = &snapshot.schema;

        let mut bases = Vec::with_capacity(snapshot.bases.len() + 1);
        let mut contributed = Vec::new();
        for base in &snapshot.bases {
            let declared = self.registry.resolve_base(&base.kind)?;
            contributed.extend(declared.contributed_fields(base.id));
            bases.push(BaseType::Declared(declared));
        }
        bases.push(BaseType::DynamicMarker);

        let own = snapshot.fields.iter().map(|field| self.materialize_field(field));
        let fields = self.assemble_fields(contributed.into_iter().chain(own).collect())?;

        let options = self.type_options(snapshot)?;
        let dependencies = dependencies_of(schema.id, &fields);

        Ok(RuntimeType {
            identity: schema.id,
            key: schema.key(),
            bases,
            fields,
            options,
            dependencies,
            generation: 0,
            obsolete: AtomicBool::new(false),
            bookkeeping,
        })
    }

    /// The storage field a definition materializes to.
    pub fn materialize_field(&self, field: &FieldDefinition) -> FieldDescriptor {
        FieldDescriptor {
            name: field.name.clone(),
            column: field.column(),
            data_type: field.kind.data_type(),
            nullable: field.nullable,
            default: field.default.clone(),
            primary_key: field.primary_key,
            unique: field.unique || field.primary_key,
            auto_increment: false,
            max_length: field.kind.max_length(),
            temporal: field.kind.temporal_options().copied().unwrap_or_default(),
            relation: field.kind.relation_target().cloned(),
            parent_link: false,
            origin: FieldOrigin::Definition(field.id),
        }
    }

    /// The key reinstated when a declared primary key goes away.
    pub fn implicit_key(&self) -> FieldDescriptor {
        FieldDescriptor::implicit_key(&self.config.implicit_primary_key)
    }

    fn assemble_fields(&self, mut fields: Vec<FieldDescriptor>) -> Result<Vec<FieldDescriptor>> {
        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &fields {
            if !names.insert(field.name.as_str()) || !columns.insert(field.column.as_str()) {
                return Err(MutantError::validation(
                    "name",
                    format!("duplicate field '{}'", field.name),
                ));
            }
        }

        let key = self.implicit_key();
        let key_taken = names.contains(key.name.as_str()) || columns.contains(key.column.as_str());

        let declared_keys = fields.iter().filter(|field| field.primary_key).count();
        if declared_keys > 1 {
            return Err(MutantError::Configuration(
                "more than one primary key declared".to_string(),
            ));
        }

        if declared_keys == 0 {
            if let Some(link) = fields.iter_mut().find(|field| field.parent_link) {
                link.primary_key = true;
            } else if key_taken {
                return Err(MutantError::validation(
                    "name",
                    format!("'{}' is reserved for the implicit primary key", key.name),
                ));
            } else {
                fields.insert(0, key);
            }
        }

        if let Some(index) = fields.iter().position(|field| field.primary_key)
            && index > 0
        {
            let key = fields.remove(index);
            fields.insert(0, key);
        }

        Ok(fields)
    }

    fn type_options(&self, snapshot: &DefinitionSnapshot) -> Result<TypeOptions> {
        let schema = &snapshot.schema;

        let verbose_name = schema
            .display_name
            .clone()
            .unwrap_or_else(|| verbose_name_from(&schema.type_name));
        let verbose_name_plural = schema
            .display_name_plural
            .clone()
            .unwrap_or_else(|| format!("{}s", verbose_name));

        let ordering: Vec<String> = snapshot
            .orderings
            .iter()
            .map(|ordering| ordering.defined_ordering())
            .collect();

        let mut unique_together = Vec::new();
        for unique in &snapshot.unique_together {
            if unique.members.is_empty() {
                continue;
            }
            let mut names = Vec::with_capacity(unique.members.len());
            for member in &unique.members {
                let field = snapshot.field(*member).ok_or_else(|| {
                    MutantError::Configuration(format!(
                        "unique together {} references unknown {}",
                        unique.id, member
                    ))
                })?;
                names.push(field.name.clone());
            }
            unique_together.push(names);
        }

        Ok(TypeOptions {
            table_name: self.config.table_name(&schema.namespace, &schema.type_name),
            verbose_name,
            verbose_name_plural,
            ordering: (!ordering.is_empty()).then_some(ordering),
            unique_together,
            externally_managed: schema.externally_managed,
        })
    }
}

fn dependencies_of(identity: SchemaId, fields: &[FieldDescriptor]) -> Vec<SchemaId> {
    let mut dependencies: Vec<SchemaId> = fields
        .iter()
        .filter_map(|field| match &field.relation {
            Some(RelationTarget::Schema(target)) if *target != identity => Some(*target),
            _ => None,
        })
        .collect();
    dependencies.sort();
    dependencies.dedup();
    dependencies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BaseId, DataType, FieldId, OrderingId, TypeKey, UniqueTogetherId};
    use crate::definition::{
        BaseDefinition, BaseKind, FieldDraft, FieldKind, OrderingDefinition, SchemaDefinition,
        UniqueTogetherDefinition,
    };
    use crate::registry::DeclaredType;

    fn schema() -> SchemaDefinition {
        SchemaDefinition {
            id: SchemaId(1),
            namespace: "shop".to_string(),
            type_name: "OrderLine".to_string(),
            display_name: None,
            display_name_plural: None,
            externally_managed: false,
        }
    }

    fn snapshot(fields: Vec<FieldDraft>) -> DefinitionSnapshot {
        DefinitionSnapshot {
            schema: schema(),
            bases: Vec::new(),
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, draft)| draft.to_definition(FieldId(i as u64 + 1), SchemaId(1)))
                .collect(),
            orderings: Vec::new(),
            unique_together: Vec::new(),
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new(8);
        registry
            .declare(
                DeclaredType::new(TypeKey::new("geo", "Place"))
                    .field(FieldDescriptor::new("name", DataType::Text)),
            )
            .unwrap();
        registry
            .register_mixin(
                "core::Timestamped",
                DeclaredType::new(TypeKey::new("core", "Timestamped"))
                    .abstract_type()
                    .field(FieldDescriptor::new("created", DataType::DateTime))
                    .ordering(&["-created"]),
            )
            .unwrap();
        registry
    }

    fn synthesize(snapshot: &DefinitionSnapshot) -> Result<RuntimeType> {
        let registry = registry();
        let config = EngineConfig::default();
        TypeSynthesizer::new(&registry, &config).synthesize(snapshot, Bookkeeping::new())
    }

    #[test]
    fn test_implicit_key_comes_first() {
        let ty = synthesize(&snapshot(vec![
            FieldDraft::new("quantity", FieldKind::Integer),
            FieldDraft::new("note", FieldKind::text()).nullable(),
        ]))
        .unwrap();

        assert_eq!(ty.columns(), vec!["id", "quantity", "note"]);
        assert!(ty.has_implicit_primary_key());
        assert_eq!(ty.table_name(), "mutant_shop_orderline");
        assert_eq!(ty.options().verbose_name, "order line");
        assert_eq!(ty.options().verbose_name_plural, "order lines");
        assert_eq!(ty.bases(), &[BaseType::DynamicMarker]);
    }

    #[test]
    fn test_declared_key_moves_to_front() {
        let ty = synthesize(&snapshot(vec![
            FieldDraft::new("note", FieldKind::text()),
            FieldDraft::new("code", FieldKind::Integer).primary_key(),
        ]))
        .unwrap();

        assert_eq!(ty.columns(), vec!["code", "note"]);
        assert!(!ty.has_implicit_primary_key());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = synthesize(&snapshot(vec![
            FieldDraft::new("a", FieldKind::Integer),
            FieldDraft::new("a", FieldKind::text()),
        ]))
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_unresolved_base_is_configuration_error() {
        let mut snapshot = snapshot(Vec::new());
        snapshot.bases.push(BaseDefinition {
            id: BaseId(1),
            owner: SchemaId(1),
            order: 0,
            kind: BaseKind::Mixin {
                reference: "core::Nope".to_string(),
            },
        });
        assert!(matches!(
            synthesize(&snapshot),
            Err(MutantError::Configuration(_))
        ));
    }

    #[test]
    fn test_parent_link_becomes_primary_key() {
        let mut snapshot = snapshot(vec![FieldDraft::new("rating", FieldKind::Integer)]);
        snapshot.bases.push(BaseDefinition {
            id: BaseId(1),
            owner: SchemaId(1),
            order: 0,
            kind: BaseKind::Model {
                type_key: TypeKey::new("geo", "Place"),
            },
        });

        let ty = synthesize(&snapshot).unwrap();
        assert_eq!(ty.columns(), vec!["place_ptr_id", "rating"]);
        assert!(ty.primary_key().unwrap().parent_link);
        assert_eq!(ty.bases().len(), 2);
    }

    #[test]
    fn test_empty_ordering_is_omitted_and_inherited() {
        let mut snapshot = snapshot(Vec::new());
        snapshot.bases.push(BaseDefinition {
            id: BaseId(1),
            owner: SchemaId(1),
            order: 0,
            kind: BaseKind::Mixin {
                reference: "core::Timestamped".to_string(),
            },
        });

        let ty = synthesize(&snapshot).unwrap();
        assert_eq!(ty.options().ordering, None);
        assert_eq!(ty.effective_ordering(), vec!["-created".to_string()]);

        snapshot.orderings.push(OrderingDefinition {
            id: OrderingId(1),
            owner: SchemaId(1),
            order: 0,
            lookup: "id".to_string(),
            descending: false,
        });
        let ty = synthesize(&snapshot).unwrap();
        assert_eq!(ty.effective_ordering(), vec!["id".to_string()]);
    }

    #[test]
    fn test_unique_together_uses_field_names() {
        let mut snapshot = snapshot(vec![
            FieldDraft::new("a", FieldKind::Integer),
            FieldDraft::new("b", FieldKind::Integer),
        ]);
        snapshot.unique_together.push(UniqueTogetherDefinition::new(
            UniqueTogetherId(1),
            SchemaId(1),
            vec![FieldId(2), FieldId(1)],
        ));
        snapshot.unique_together.push(UniqueTogetherDefinition::new(
            UniqueTogetherId(2),
            SchemaId(1),
            Vec::new(),
        ));

        let ty = synthesize(&snapshot).unwrap();
        assert_eq!(
            ty.options().unique_together,
            vec![vec!["a".to_string(), "b".to_string()]]
        );
    }

    #[test]
    fn test_relations_become_dependencies() {
        let ty = synthesize(&snapshot(vec![
            FieldDraft::new(
                "order",
                FieldKind::ForeignKey {
                    target: RelationTarget::Schema(SchemaId(9)),
                },
            ),
            FieldDraft::new(
                "parent",
                FieldKind::ForeignKey {
                    target: RelationTarget::Schema(SchemaId(1)),
                },
            )
            .nullable(),
        ]))
        .unwrap();

        assert_eq!(ty.dependencies(), &[SchemaId(9)]);
        assert_eq!(ty.field("order").unwrap().column, "order_id");
    }
}
